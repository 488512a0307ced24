use async_trait::async_trait;

use super::{AccountLinker, LinkRequest, LinkResponse};
use crate::error::AuthError;

/// Account linker backed by the account service's `POST /user/auth`.
pub struct HttpAccountLinker {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpAccountLinker {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/user/auth", base_url.trim_end_matches('/')),
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AccountLinker for HttpAccountLinker {
    async fn link(&self, request: &LinkRequest) -> Result<LinkResponse, AuthError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AuthError::Linking(format!("account service unreachable: {e}")))?;

        let status = resp.status();
        let body: LinkResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Linking(format!("invalid account service response: {e}")))?;

        if let Some(error) = body.error.as_deref().filter(|e| !e.is_empty()) {
            tracing::warn!(
                "[Link] account service refused {} sign-in: {error}",
                request.provider
            );
            return Err(AuthError::Linking(error.to_string()));
        }

        if !status.is_success() {
            return Err(AuthError::Linking(format!(
                "account service returned {status}"
            )));
        }

        tracing::debug!("[Link] linked {} account", request.provider);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_joined_without_double_slash() {
        assert_eq!(
            HttpAccountLinker::new("http://accounts.internal/").endpoint(),
            "http://accounts.internal/user/auth"
        );
    }

    #[tokio::test]
    async fn unreachable_service_denies_sign_in() {
        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let linker = HttpAccountLinker::new("http://127.0.0.1:9");
        let request = LinkRequest {
            provider: "telegram".into(),
            provider_id: "42".into(),
            name: "Ada".into(),
            avatar_url: String::new(),
        };
        assert!(matches!(
            linker.link(&request).await,
            Err(AuthError::Linking(_))
        ));
    }
}
