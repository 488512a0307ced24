//! Observability hooks for signed-payload verification.
//!
//! Observers only ever see field *names*, the rejection reason and, once a
//! payload has been accepted, the subject id. Field values, the signature and
//! the shared secret are never handed out.

use super::signed_payload::Rejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    Accepted,
    Rejected(&'a Rejection),
}

#[derive(Debug, Clone)]
pub struct VerificationEvent<'a> {
    pub outcome: Outcome<'a>,
    /// Names of the submitted fields, signature excluded, in canonical order.
    pub field_names: Vec<&'a str>,
    /// The `id` field, present only for accepted payloads.
    pub subject: Option<String>,
}

pub trait VerificationObserver: Send + Sync {
    fn record(&self, event: &VerificationEvent<'_>);
}

/// Default observer: structured `tracing` output.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl VerificationObserver for TracingObserver {
    fn record(&self, event: &VerificationEvent<'_>) {
        match event.outcome {
            Outcome::Accepted => tracing::info!(
                subject = event.subject.as_deref().unwrap_or_default(),
                fields = ?event.field_names,
                "[Verify] signed payload accepted"
            ),
            Outcome::Rejected(reason) => tracing::warn!(
                %reason,
                fields = ?event.field_names,
                "[Verify] signed payload rejected"
            ),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl VerificationObserver for NoopObserver {
    fn record(&self, _event: &VerificationEvent<'_>) {}
}
