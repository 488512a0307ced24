//! Account linking — tells the account service about every sign-in.
//!
//! The account service owns user records. It answers with whatever it knows
//! about the linked user (currently whether a Solana wallet is linked), or
//! with an `error` that must deny the sign-in.

mod http;

pub use http::HttpAccountLinker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::providers::ProviderUser;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    pub avatar_url: String,
}

impl From<&ProviderUser> for LinkRequest {
    fn from(user: &ProviderUser) -> Self {
        Self {
            provider: user.provider.clone(),
            provider_id: user.id.clone(),
            name: user.name.clone(),
            avatar_url: user.image.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    #[serde(default)]
    pub has_linked_solana: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    /// Account the sign-in resolved to. Connections from an existing session
    /// are only kept when it matches that session's account.
    #[serde(default)]
    pub account_id: Option<String>,
}

#[async_trait]
pub trait AccountLinker: Send + Sync {
    /// Record a sign-in. An `Err` denies the sign-in.
    async fn link(&self, request: &LinkRequest) -> Result<LinkResponse, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_and_empty_avatar() {
        let user = ProviderUser {
            id: "42".into(),
            name: "Ada".into(),
            image: None,
            username: Some("ada".into()),
            provider: "telegram".into(),
        };
        let body = serde_json::to_value(LinkRequest::from(&user)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "provider": "telegram",
                "providerId": "42",
                "name": "Ada",
                "avatarUrl": "",
            })
        );
    }

    #[test]
    fn response_fields_are_optional() {
        let resp: LinkResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(resp, LinkResponse::default());

        let resp: LinkResponse =
            serde_json::from_str(r#"{"hasLinkedSolana":true,"userId":"u1"}"#).unwrap();
        assert_eq!(resp.has_linked_solana, Some(true));
        assert_eq!(resp.account_id, None);

        let resp: LinkResponse = serde_json::from_str(r#"{"accountId":"acct-7"}"#).unwrap();
        assert_eq!(resp.account_id.as_deref(), Some("acct-7"));
    }
}
