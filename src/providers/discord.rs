use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{OAuthProvider, ProviderUser, TokenSet};
use crate::error::AuthError;

const AUTHORIZE_URL: &str = "https://discord.com/api/oauth2/authorize";
const TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
const USER_URL: &str = "https://discord.com/api/users/@me";
const CDN_URL: &str = "https://cdn.discordapp.com";

/// Discord OAuth 2.0 provider.
///
/// Quirks:
/// - Standard OAuth 2.0 flow; `identify` gives the profile, `email` the address.
/// - Users migrated to unique usernames have discriminator `"0"`, which
///   changes how the default avatar is chosen.
pub struct DiscordProvider {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DiscordTokenResponse {
    access_token: String,
    token_type: String,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
    global_name: Option<String>,
    avatar: Option<String>,
}

impl DiscordProvider {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http: reqwest::Client::new(),
        }
    }
}

impl DiscordUser {
    fn image_url(&self) -> String {
        match &self.avatar {
            Some(hash) => {
                let format = if hash.starts_with("a_") { "gif" } else { "png" };
                format!("{CDN_URL}/avatars/{}/{hash}.{format}", self.id)
            }
            None => format!("{CDN_URL}/embed/avatars/{}.png", self.default_avatar_index()),
        }
    }

    fn default_avatar_index(&self) -> u64 {
        match self.discriminator.as_deref() {
            None | Some("0") => self.id.parse::<u64>().map(|id| (id >> 22) % 6).unwrap_or(0),
            Some(d) => d.parse::<u64>().map(|d| d % 5).unwrap_or(0),
        }
    }

    fn into_provider_user(self) -> ProviderUser {
        let image = self.image_url();
        ProviderUser {
            name: self.global_name.clone().unwrap_or_else(|| self.username.clone()),
            image: Some(image),
            username: Some(self.username),
            id: self.id,
            provider: "discord".into(),
        }
    }
}

#[async_trait]
impl OAuthProvider for DiscordProvider {
    fn id(&self) -> &str {
        "discord"
    }

    fn display_name(&self) -> &str {
        "Discord"
    }

    fn default_scopes(&self) -> Vec<String> {
        vec!["identify".into(), "email".into()]
    }

    fn auth_url(&self, scopes: &[String], state: &str, redirect_uri: &str) -> String {
        let scope_str = if scopes.is_empty() {
            self.default_scopes().join(" ")
        } else {
            scopes.join(" ")
        };
        format!(
            "{AUTHORIZE_URL}?\
             client_id={client_id}\
             &redirect_uri={redirect_uri}\
             &response_type=code\
             &scope={scope}\
             &state={state}\
             &prompt=consent",
            client_id = urlencoding(&self.client_id),
            redirect_uri = urlencoding(redirect_uri),
            scope = urlencoding(&scope_str),
            state = urlencoding(state),
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, AuthError> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::FlowError(format!("Token exchange request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::FlowError(format!(
                "Discord token exchange failed: {body}"
            )));
        }

        let token_resp: DiscordTokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::FlowError(format!("Failed to parse token response: {e}")))?;

        Ok(TokenSet {
            access_token: token_resp.access_token,
            refresh_token: token_resp.refresh_token,
            token_type: token_resp.token_type,
            expires_in: token_resp.expires_in,
            refresh_token_expires_in: None,
            scope: token_resp.scope,
        })
    }

    async fn fetch_user(&self, tokens: &TokenSet) -> Result<ProviderUser, AuthError> {
        let resp = self
            .http
            .get(USER_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| AuthError::FlowError(format!("Profile request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AuthError::FlowError(format!(
                "Discord profile request failed with {}",
                resp.status()
            )));
        }

        let user: DiscordUser = resp
            .json()
            .await
            .map_err(|e| AuthError::FlowError(format!("Failed to parse Discord profile: {e}")))?;

        Ok(user.into_provider_user())
    }
}

fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(json: serde_json::Value) -> DiscordUser {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn auth_url_carries_state_and_default_scopes() {
        let provider = DiscordProvider::new("client-1".into(), "secret".into());
        let url = provider.auth_url(&[], "st@te", "http://localhost:8430/v1/auth/callback/discord");

        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains("scope=identify+email"));
        assert!(url.contains("state=st%40te"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8430%2Fv1%2Fauth%2Fcallback%2Fdiscord"));
        assert!(!url.contains("secret"));
    }

    #[test]
    fn profile_prefers_global_name() {
        let u = user(serde_json::json!({
            "id": "80351110224678912",
            "username": "nelly",
            "discriminator": "0",
            "global_name": "Nelly",
            "avatar": "8342729096ea3675442027381ff50dfe",
        }))
        .into_provider_user();

        assert_eq!(u.name, "Nelly");
        assert_eq!(u.username.as_deref(), Some("nelly"));
        assert_eq!(
            u.image.as_deref(),
            Some("https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png")
        );
    }

    #[test]
    fn animated_avatar_uses_gif() {
        let u = user(serde_json::json!({
            "id": "1",
            "username": "anim",
            "global_name": null,
            "avatar": "a_123",
        }));
        assert!(u.image_url().ends_with("/avatars/1/a_123.gif"));
        assert_eq!(u.into_provider_user().name, "anim");
    }

    #[test]
    fn default_avatar_depends_on_discriminator() {
        let migrated = user(serde_json::json!({
            "id": "80351110224678912",
            "username": "nelly",
            "discriminator": "0",
            "global_name": null,
            "avatar": null,
        }));
        let expected = (80351110224678912u64 >> 22) % 6;
        assert_eq!(
            migrated.image_url(),
            format!("https://cdn.discordapp.com/embed/avatars/{expected}.png")
        );

        let legacy = user(serde_json::json!({
            "id": "1",
            "username": "old",
            "discriminator": "1337",
            "global_name": null,
            "avatar": null,
        }));
        assert_eq!(legacy.image_url(), "https://cdn.discordapp.com/embed/avatars/2.png");
    }
}
