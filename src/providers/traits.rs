use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// A set of tokens returned from an OAuth provider after code exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub refresh_token_expires_in: Option<u64>,
    pub scope: Option<String>,
}

/// The identity a provider hands back after a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    /// Provider-side user id.
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub username: Option<String>,
    /// Id of the provider that authenticated this user.
    pub provider: String,
}

/// Submitted credentials, as decoded from a JSON or form body.
pub type Credentials = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
}

/// One input a credentials provider accepts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CredentialField {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: FieldKind,
}

/// Trait that every OAuth provider must implement.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Unique provider identifier (e.g., "discord").
    fn id(&self) -> &str;

    /// Human-readable display name (e.g., "Discord").
    fn display_name(&self) -> &str;

    /// Scopes requested when the caller does not ask for any.
    fn default_scopes(&self) -> Vec<String>;

    /// Build the authorization URL that the user should be redirected to.
    ///
    /// - `scopes`: The OAuth scopes to request.
    /// - `state`: An opaque, HMAC-signed state string for CSRF protection.
    /// - `redirect_uri`: The callback URL registered with the provider.
    fn auth_url(&self, scopes: &[String], state: &str, redirect_uri: &str) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, AuthError>;

    /// Fetch the signed-in user's profile with freshly exchanged tokens.
    async fn fetch_user(&self, tokens: &TokenSet) -> Result<ProviderUser, AuthError>;
}

/// Trait for providers that authenticate a submitted set of fields directly,
/// without a redirect round-trip.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Fields the sign-in form is expected to submit.
    fn credential_fields(&self) -> &[CredentialField];

    /// Return the authenticated user, or `None` if the credentials are not valid.
    async fn authorize(&self, credentials: &Credentials) -> Option<ProviderUser>;
}
