mod cipher;
mod secret;
mod state;

pub use cipher::TokenCipher;
pub use secret::SecretString;
pub use state::{StateSigner, STATE_MAX_AGE_SECS};
