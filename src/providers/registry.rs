use std::collections::HashMap;

use serde::Serialize;

use super::traits::{CredentialField, CredentialsProvider, OAuthProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Oauth,
    Credentials,
}

/// Public description of a registered provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<CredentialField>,
}

/// Registry of sign-in providers, keyed by provider ID.
#[derive(Default)]
pub struct ProviderRegistry {
    oauth: HashMap<String, Box<dyn OAuthProvider>>,
    credentials: HashMap<String, Box<dyn CredentialsProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an OAuth provider, replacing any provider with the same ID.
    pub fn register_oauth(&mut self, provider: Box<dyn OAuthProvider>) {
        let id = provider.id().to_string();
        self.credentials.remove(&id);
        self.oauth.insert(id, provider);
    }

    /// Register a credentials provider, replacing any provider with the same ID.
    pub fn register_credentials(&mut self, provider: Box<dyn CredentialsProvider>) {
        let id = provider.id().to_string();
        self.oauth.remove(&id);
        self.credentials.insert(id, provider);
    }

    pub fn oauth(&self, id: &str) -> Option<&dyn OAuthProvider> {
        self.oauth.get(id).map(|p| p.as_ref())
    }

    pub fn credentials(&self, id: &str) -> Option<&dyn CredentialsProvider> {
        self.credentials.get(id).map(|p| p.as_ref())
    }

    /// All registered providers, sorted by ID.
    pub fn list(&self) -> Vec<ProviderInfo> {
        let oauth = self.oauth.values().map(|p| ProviderInfo {
            id: p.id().to_string(),
            name: p.display_name().to_string(),
            kind: ProviderKind::Oauth,
            fields: Vec::new(),
        });
        let credentials = self.credentials.values().map(|p| ProviderInfo {
            id: p.id().to_string(),
            name: p.display_name().to_string(),
            kind: ProviderKind::Credentials,
            fields: p.credential_fields().to_vec(),
        });

        let mut all: Vec<ProviderInfo> = oauth.chain(credentials).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Number of registered providers.
    pub fn count(&self) -> usize {
        self.oauth.len() + self.credentials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretString;
    use crate::providers::{DiscordProvider, TelegramProvider};

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register_credentials(Box::new(TelegramProvider::new(&SecretString::from("1:x"))));
        registry.register_oauth(Box::new(DiscordProvider::new("id".into(), "secret".into())));
        registry
    }

    #[test]
    fn lookups_are_kind_specific() {
        let registry = registry();
        assert!(registry.oauth("discord").is_some());
        assert!(registry.credentials("discord").is_none());
        assert!(registry.credentials("telegram").is_some());
        assert!(registry.oauth("telegram").is_none());
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn list_is_sorted_and_describes_fields() {
        let list = registry().list();
        let ids: Vec<&str> = list.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["discord", "telegram"]);
        assert_eq!(list[0].kind, ProviderKind::Oauth);
        assert!(list[0].fields.is_empty());
        assert_eq!(list[1].kind, ProviderKind::Credentials);
        assert!(list[1].fields.iter().any(|f| f.name == "hash"));
    }
}
