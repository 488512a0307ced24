mod discord;
mod registry;
mod telegram;
mod traits;

pub use discord::DiscordProvider;
pub use registry::{ProviderInfo, ProviderKind, ProviderRegistry};
pub use telegram::TelegramProvider;
pub use traits::{
    CredentialField, Credentials, CredentialsProvider, FieldKind, OAuthProvider, ProviderUser,
    TokenSet,
};

use std::sync::Arc;

use crate::auth::VerificationObserver;
use crate::config::Config;

/// Register every provider that has credentials configured.
pub fn register_defaults(
    registry: &mut ProviderRegistry,
    config: &Config,
    observer: Arc<dyn VerificationObserver>,
) {
    if let (Some(id), Some(secret)) = (&config.discord_client_id, &config.discord_client_secret) {
        registry.register_oauth(Box::new(DiscordProvider::new(
            id.clone(),
            secret.expose_secret().to_string(),
        )));
    }

    if let Some(bot_token) = &config.telegram_bot_token {
        let mut telegram = TelegramProvider::new(bot_token).with_observer(observer);
        if let Some(max_age) = config.telegram_max_auth_age {
            telegram = telegram.with_max_age(max_age);
        }
        registry.register_credentials(Box::new(telegram));
    }
}
