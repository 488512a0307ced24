//! Session pipeline: turning a provider sign-in into a signed session token,
//! and a session token into the client-visible session.
//!
//! A session token accumulates one [`Connection`] per provider, so signing
//! in with Discord and then Telegram leaves both linked. Provider tokens
//! inside a connection are AES-GCM encrypted and never leave the server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::crypto::{SecretString, TokenCipher};
use crate::error::AuthError;
use crate::linking::{AccountLinker, LinkRequest};
use crate::providers::{ProviderKind, ProviderUser, TokenSet};

// ─────────────────────────────────────────────────────────────────────────────
// Token shape
// ─────────────────────────────────────────────────────────────────────────────

/// One linked provider inside a session token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub name: String,
    pub image: String,
    /// Encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    /// Encrypted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_expiration_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_linked_solana: Option<bool>,
}

/// Claims carried by the session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Account id confirmed by the account service, when it reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default)]
    pub connections: BTreeMap<String, Connection>,
    pub iat: i64,
    pub exp: i64,
}

/// How the user signed in.
#[derive(Debug, Clone)]
pub struct Account {
    pub provider: String,
    pub kind: ProviderKind,
    pub tokens: Option<TokenSet>,
}

impl Account {
    pub fn oauth(provider: impl Into<String>, tokens: TokenSet) -> Self {
        Self {
            provider: provider.into(),
            kind: ProviderKind::Oauth,
            tokens: Some(tokens),
        }
    }

    pub fn credentials(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind: ProviderKind::Credentials,
            tokens: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client view
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConnection {
    pub name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_linked_solana: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub connections: BTreeMap<String, SessionConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

/// Decrypted provider tokens, for internal callers only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub expires_at: Option<i64>,
    pub refresh_token: Option<String>,
}

/// `now + secs`, or `None` when `secs` does not fit a unix timestamp.
fn expires_at(now: i64, secs: u64) -> Option<i64> {
    i64::try_from(secs).ok().map(|secs| now.saturating_add(secs))
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    cipher: TokenCipher,
    linker: Arc<dyn AccountLinker>,
}

impl SessionManager {
    pub fn new(
        secret: &SecretString,
        ttl: Duration,
        cipher: TokenCipher,
        linker: Arc<dyn AccountLinker>,
    ) -> Self {
        let key = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            ttl,
            cipher,
            linker,
        }
    }

    /// Fold a successful provider sign-in into the session token.
    pub async fn on_sign_in(
        &self,
        existing: Option<SessionClaims>,
        user: &ProviderUser,
        account: &Account,
    ) -> Result<SessionClaims, AuthError> {
        self.on_sign_in_at(existing, user, account, Utc::now().timestamp())
            .await
    }

    pub async fn on_sign_in_at(
        &self,
        existing: Option<SessionClaims>,
        user: &ProviderUser,
        account: &Account,
        now: i64,
    ) -> Result<SessionClaims, AuthError> {
        let link = self.linker.link(&LinkRequest::from(user)).await?;

        let tokens = account.tokens.as_ref();
        let connection = Connection {
            name: user.username.clone().unwrap_or_default(),
            image: user.image.clone().unwrap_or_default(),
            access_token: tokens
                .map(|t| self.cipher.encrypt(&t.access_token))
                .transpose()?,
            expiration_time: tokens
                .and_then(|t| t.expires_in)
                .and_then(|secs| expires_at(now, secs)),
            refresh_token: tokens
                .and_then(|t| t.refresh_token.as_deref())
                .map(|rt| self.cipher.encrypt(rt))
                .transpose()?,
            refresh_token_expiration_time: tokens
                .and_then(|t| t.refresh_token_expires_in)
                .and_then(|secs| expires_at(now, secs)),
            has_linked_solana: link.has_linked_solana,
        };

        // Earlier connections carry over only into the same confirmed account.
        let carried = existing.filter(|prev| {
            link.account_id.is_some() && prev.account == link.account_id
        });
        let mut connections = carried.map(|c| c.connections).unwrap_or_default();
        connections.insert(account.provider.clone(), connection);

        tracing::info!(
            "[Session] {} sign-in for {} ({} linked)",
            account.provider,
            user.id,
            connections.len()
        );

        Ok(SessionClaims {
            sub: user.id.clone(),
            name: Some(user.name.clone()).filter(|n| !n.is_empty()),
            picture: user.image.clone(),
            account: link.account_id,
            connections,
            iat: now,
            exp: expires_at(now, self.ttl.as_secs()).unwrap_or(i64::MAX),
        })
    }

    /// Project the token into what the client is allowed to see.
    pub fn session(&self, claims: &SessionClaims) -> Session {
        let connections = claims
            .connections
            .iter()
            .map(|(provider, c)| {
                (
                    provider.clone(),
                    SessionConnection {
                        name: c.name.clone(),
                        image: c.image.clone(),
                        has_linked_solana: c.has_linked_solana,
                    },
                )
            })
            .collect();

        Session {
            user: SessionUser {
                id: claims.sub.clone(),
                name: claims.name.clone(),
                image: claims.picture.clone(),
                connections,
            },
            expires: DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_default(),
        }
    }

    pub fn issue(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign session: {e}")))
    }

    pub fn decode(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        Ok(decode::<SessionClaims>(token, &self.decoding, &validation)?.claims)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Decrypt the tokens stored for `provider`, if that provider is linked
    /// and issued any.
    pub fn provider_tokens(
        &self,
        claims: &SessionClaims,
        provider: &str,
    ) -> Result<Option<ProviderTokens>, AuthError> {
        let Some(connection) = claims.connections.get(provider) else {
            return Ok(None);
        };
        let Some(access_token) = &connection.access_token else {
            return Ok(None);
        };

        Ok(Some(ProviderTokens {
            access_token: self.cipher.decrypt(access_token)?,
            expires_at: connection.expiration_time,
            refresh_token: connection
                .refresh_token
                .as_deref()
                .map(|rt| self.cipher.decrypt(rt))
                .transpose()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linking::LinkResponse;
    use async_trait::async_trait;
    use base64::Engine as _;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const NOW: i64 = 1_700_000_000;

    #[derive(Default)]
    struct FakeLinker {
        requests: Mutex<Vec<LinkRequest>>,
        refuse: bool,
        /// provider id -> account id reported back.
        accounts: HashMap<String, String>,
    }

    impl FakeLinker {
        fn with_accounts(pairs: &[(&str, &str)]) -> Self {
            Self {
                accounts: pairs
                    .iter()
                    .map(|(p, a)| (p.to_string(), a.to_string()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AccountLinker for FakeLinker {
        async fn link(&self, request: &LinkRequest) -> Result<crate::linking::LinkResponse, AuthError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.refuse {
                return Err(AuthError::Linking("User is banned".into()));
            }
            Ok(LinkResponse {
                has_linked_solana: Some(request.provider == "discord"),
                error: None,
                account_id: self.accounts.get(&request.provider_id).cloned(),
            })
        }
    }

    fn manager(linker: Arc<FakeLinker>) -> SessionManager {
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        SessionManager::new(
            &SecretString::from("session-secret"),
            Duration::from_secs(3600),
            TokenCipher::new(&key).unwrap(),
            linker,
        )
    }

    fn telegram_user() -> ProviderUser {
        ProviderUser {
            id: "42".into(),
            name: "Ada Lovelace".into(),
            image: Some("https://t.me/ada.jpg".into()),
            username: Some("ada".into()),
            provider: "telegram".into(),
        }
    }

    fn discord_user() -> ProviderUser {
        ProviderUser {
            id: "8035".into(),
            name: "Ada".into(),
            image: None,
            username: Some("ada_d".into()),
            provider: "discord".into(),
        }
    }

    fn discord_tokens() -> TokenSet {
        TokenSet {
            access_token: "discord-access".into(),
            refresh_token: Some("discord-refresh".into()),
            token_type: "Bearer".into(),
            expires_in: Some(604_800),
            refresh_token_expires_in: None,
            scope: Some("identify email".into()),
        }
    }

    #[tokio::test]
    async fn credentials_sign_in_builds_connection() {
        let linker = Arc::new(FakeLinker::default());
        let sessions = manager(linker.clone());

        let claims = sessions
            .on_sign_in_at(None, &telegram_user(), &Account::credentials("telegram"), NOW)
            .await
            .unwrap();

        assert_eq!(claims.sub, "42");
        assert_eq!(claims.exp, NOW + 3600);
        let telegram = &claims.connections["telegram"];
        assert_eq!(telegram.name, "ada");
        assert_eq!(telegram.image, "https://t.me/ada.jpg");
        assert!(telegram.access_token.is_none());
        assert_eq!(telegram.has_linked_solana, Some(false));

        let requests = linker.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].provider_id, "42");
        assert_eq!(requests[0].avatar_url, "https://t.me/ada.jpg");
    }

    #[tokio::test]
    async fn connections_accumulate_across_providers() {
        let sessions = manager(Arc::new(FakeLinker::with_accounts(&[
            ("42", "acct-ada"),
            ("8035", "acct-ada"),
        ])));

        let first = sessions
            .on_sign_in_at(None, &telegram_user(), &Account::credentials("telegram"), NOW)
            .await
            .unwrap();
        let second = sessions
            .on_sign_in_at(
                Some(first),
                &discord_user(),
                &Account::oauth("discord", discord_tokens()),
                NOW + 10,
            )
            .await
            .unwrap();

        assert_eq!(second.sub, "8035");
        assert_eq!(second.account.as_deref(), Some("acct-ada"));
        assert_eq!(
            second.connections.keys().collect::<Vec<_>>(),
            ["discord", "telegram"]
        );
        let discord = &second.connections["discord"];
        assert_eq!(discord.expiration_time, Some(NOW + 10 + 604_800));
        assert_eq!(discord.has_linked_solana, Some(true));
        assert_ne!(discord.access_token.as_deref(), Some("discord-access"));
    }

    #[tokio::test]
    async fn other_account_does_not_inherit_connections() {
        let sessions = manager(Arc::new(FakeLinker::with_accounts(&[
            ("8035", "acct-a"),
            ("42", "acct-b"),
        ])));

        let a = sessions
            .on_sign_in_at(
                None,
                &discord_user(),
                &Account::oauth("discord", discord_tokens()),
                NOW,
            )
            .await
            .unwrap();
        let b = sessions
            .on_sign_in_at(Some(a), &telegram_user(), &Account::credentials("telegram"), NOW + 5)
            .await
            .unwrap();

        assert_eq!(b.account.as_deref(), Some("acct-b"));
        assert_eq!(b.connections.keys().collect::<Vec<_>>(), ["telegram"]);
        assert!(sessions.provider_tokens(&b, "discord").unwrap().is_none());
    }

    #[tokio::test]
    async fn unconfirmed_account_starts_fresh() {
        let sessions = manager(Arc::new(FakeLinker::default()));

        let first = sessions
            .on_sign_in_at(
                None,
                &discord_user(),
                &Account::oauth("discord", discord_tokens()),
                NOW,
            )
            .await
            .unwrap();
        let second = sessions
            .on_sign_in_at(Some(first), &telegram_user(), &Account::credentials("telegram"), NOW)
            .await
            .unwrap();

        assert!(second.account.is_none());
        assert_eq!(second.connections.keys().collect::<Vec<_>>(), ["telegram"]);
    }

    #[tokio::test]
    async fn huge_provider_lifetimes_do_not_overflow() {
        let sessions = manager(Arc::new(FakeLinker::default()));
        let tokens = TokenSet {
            expires_in: Some(u64::MAX),
            refresh_token_expires_in: Some(i64::MAX as u64),
            ..discord_tokens()
        };

        let claims = sessions
            .on_sign_in_at(None, &discord_user(), &Account::oauth("discord", tokens), NOW)
            .await
            .unwrap();

        let discord = &claims.connections["discord"];
        assert_eq!(discord.expiration_time, None);
        assert_eq!(discord.refresh_token_expiration_time, Some(i64::MAX));
        assert_eq!(expires_at(i64::MAX - 1, 10), Some(i64::MAX));
    }

    #[tokio::test]
    async fn linker_error_denies_sign_in() {
        let sessions = manager(Arc::new(FakeLinker {
            refuse: true,
            ..Default::default()
        }));
        let result = sessions
            .on_sign_in_at(None, &telegram_user(), &Account::credentials("telegram"), NOW)
            .await;
        assert!(matches!(result, Err(AuthError::Linking(_))));
    }

    #[tokio::test]
    async fn session_view_hides_provider_tokens() {
        let sessions = manager(Arc::new(FakeLinker::default()));
        let claims = sessions
            .on_sign_in_at(
                None,
                &discord_user(),
                &Account::oauth("discord", discord_tokens()),
                NOW,
            )
            .await
            .unwrap();

        let session = sessions.session(&claims);
        assert_eq!(session.user.id, "8035");
        assert_eq!(session.expires.timestamp(), NOW + 3600);

        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("hasLinkedSolana"));
        assert!(!json.contains("accessToken"));
        assert!(!json.contains("refreshToken"));
    }

    #[tokio::test]
    async fn provider_tokens_decrypt_for_internal_use() {
        let sessions = manager(Arc::new(FakeLinker::default()));
        let claims = sessions
            .on_sign_in_at(
                None,
                &discord_user(),
                &Account::oauth("discord", discord_tokens()),
                NOW,
            )
            .await
            .unwrap();

        let tokens = sessions.provider_tokens(&claims, "discord").unwrap().unwrap();
        assert_eq!(tokens.access_token, "discord-access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("discord-refresh"));
        assert!(sessions.provider_tokens(&claims, "telegram").unwrap().is_none());
    }

    #[tokio::test]
    async fn issued_token_decodes_and_rejects_tampering() {
        let sessions = manager(Arc::new(FakeLinker::default()));
        let now = Utc::now().timestamp();
        let claims = sessions
            .on_sign_in_at(None, &telegram_user(), &Account::credentials("telegram"), now)
            .await
            .unwrap();

        let token = sessions.issue(&claims).unwrap();
        assert_eq!(sessions.decode(&token).unwrap(), claims);

        let mut tampered = token.clone();
        tampered.push('x');
        assert!(sessions.decode(&tampered).is_err());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let sessions = manager(Arc::new(FakeLinker::default()));
        let past = Utc::now().timestamp() - 7200;
        let claims = sessions
            .on_sign_in_at(None, &telegram_user(), &Account::credentials("telegram"), past)
            .await
            .unwrap();

        let token = sessions.issue(&claims).unwrap();
        assert!(matches!(sessions.decode(&token), Err(AuthError::TokenExpired)));
    }
}
