use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{CredentialField, Credentials, CredentialsProvider, FieldKind, ProviderUser};
use crate::auth::{SignedPayload, SignedPayloadVerifier, VerificationObserver};
use crate::crypto::SecretString;

/// Telegram Login Widget provider.
///
/// Telegram does NOT use OAuth. The widget hands the browser a set of user
/// fields signed with HMAC-SHA256 keyed by SHA-256(bot_token); the browser
/// submits them here and we verify the signature.
pub struct TelegramProvider {
    verifier: SignedPayloadVerifier,
}

const FIELDS: &[CredentialField] = &[
    CredentialField { name: "id", kind: FieldKind::Text },
    CredentialField { name: "first_name", kind: FieldKind::Text },
    CredentialField { name: "last_name", kind: FieldKind::Text },
    CredentialField { name: "username", kind: FieldKind::Text },
    CredentialField { name: "photo_url", kind: FieldKind::Text },
    CredentialField { name: "hash", kind: FieldKind::Text },
    CredentialField { name: "auth_date", kind: FieldKind::Number },
];

impl TelegramProvider {
    pub fn new(bot_token: &SecretString) -> Self {
        Self {
            verifier: SignedPayloadVerifier::from_secret(bot_token),
        }
    }

    /// Reject logins whose `auth_date` is older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.verifier = self.verifier.with_max_age(max_age);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn VerificationObserver>) -> Self {
        self.verifier = self.verifier.with_observer(observer);
        self
    }

    /// Keep only the widget's own fields; anything else the client sent is
    /// neither signed nor trusted.
    fn project(credentials: &Credentials) -> Option<SignedPayload> {
        let widget_fields: Credentials = FIELDS
            .iter()
            .filter_map(|f| {
                credentials
                    .get(f.name)
                    .map(|v| (f.name.to_string(), v.clone()))
            })
            .collect();
        SignedPayload::from_json_map(&widget_fields).ok()
    }
}

fn text(payload: &SignedPayload, field: &str) -> Option<String> {
    payload
        .get(field)
        .map(|v| v.render())
        .filter(|s| !s.is_empty() && s != "undefined")
}

#[async_trait]
impl CredentialsProvider for TelegramProvider {
    fn id(&self) -> &str {
        "telegram"
    }

    fn display_name(&self) -> &str {
        "Telegram"
    }

    fn credential_fields(&self) -> &[CredentialField] {
        FIELDS
    }

    async fn authorize(&self, credentials: &Credentials) -> Option<ProviderUser> {
        let payload = Self::project(credentials)?;
        if !self.verifier.verify(&payload) {
            return None;
        }

        let first_name = text(&payload, "first_name").unwrap_or_default();
        let last_name = text(&payload, "last_name").unwrap_or_default();

        Some(ProviderUser {
            id: text(&payload, "id")?,
            name: format!("{first_name} {last_name}").trim().to_string(),
            image: text(&payload, "photo_url"),
            username: text(&payload, "username"),
            provider: self.id().to_string(),
        })
    }
}
