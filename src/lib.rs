pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod linking;
pub mod providers;

pub use config::Config;
pub use error::AuthError;

use std::sync::Arc;

use auth::{SessionManager, TracingObserver, VerificationObserver};
use crypto::{StateSigner, TokenCipher};
use linking::{AccountLinker, HttpAccountLinker};
use providers::ProviderRegistry;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub state_signer: StateSigner,
    pub registry: ProviderRegistry,
    pub sessions: SessionManager,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Assemble the state from explicit collaborators.
    pub fn new(
        config: Config,
        registry: ProviderRegistry,
        linker: Arc<dyn AccountLinker>,
    ) -> Result<Self, AuthError> {
        let state_signer = StateSigner::new(config.hmac_secret.expose_secret())?;
        let cipher = TokenCipher::new(config.master_key.expose_secret())?;
        let sessions = SessionManager::new(&config.session_secret, config.session_ttl, cipher, linker);

        Ok(Self {
            config,
            state_signer,
            registry,
            sessions,
        })
    }

    /// Production wiring: configured providers, HTTP account linker and
    /// `tracing`-backed verification events.
    pub fn from_config(config: Config) -> Result<Self, AuthError> {
        let observer: Arc<dyn VerificationObserver> = Arc::new(TracingObserver);
        let mut registry = ProviderRegistry::new();
        providers::register_defaults(&mut registry, &config, observer);

        let linker = Arc::new(HttpAccountLinker::new(&config.account_api_url));
        Self::new(config, registry, linker)
    }
}
