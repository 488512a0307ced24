//! Authentication core: signed-payload verification and the session pipeline.

pub mod observer;
pub mod session;
pub mod signed_payload;

pub use observer::{NoopObserver, Outcome, TracingObserver, VerificationEvent, VerificationObserver};
pub use session::{Account, Session, SessionClaims, SessionManager};
pub use signed_payload::{FieldValue, Rejection, SignedPayload, SignedPayloadVerifier};
