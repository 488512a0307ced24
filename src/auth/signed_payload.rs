//! Verification of HMAC-signed login payloads (Telegram Login Widget format).
//!
//! The signer and the verifier must agree byte for byte on the check-string:
//!
//! 1. drop the `hash` field, and any field that is null or the literal `"undefined"`
//! 2. sort the remaining keys by byte order
//! 3. join `key=value` pairs with `\n`, no trailing newline
//!
//! The HMAC-SHA256 key is `SHA256(secret)`, and the signature is the lowercase
//! hex digest of the check-string.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::observer::{Outcome, TracingObserver, VerificationEvent, VerificationObserver};
use crate::crypto::SecretString;

type HmacSha256 = Hmac<Sha256>;

/// Field carrying the hex signature.
pub const SIGNATURE_FIELD: &str = "hash";
pub const ID_FIELD: &str = "id";
pub const USERNAME_FIELD: &str = "username";
pub const AUTH_DATE_FIELD: &str = "auth_date";

const REQUIRED_FIELDS: [&str; 3] = [ID_FIELD, USERNAME_FIELD, SIGNATURE_FIELD];

/// Placeholder some clients serialize for absent values.
const UNDEFINED_LITERAL: &str = "undefined";

// ─────────────────────────────────────────────────────────────────────────────
// Payload
// ─────────────────────────────────────────────────────────────────────────────

/// A single payload value. Only strings and numbers are signable.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(Number),
}

impl FieldValue {
    /// Render the value the way it appears in the check-string.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => render_number(n),
        }
    }

    fn is_undefined(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s == UNDEFINED_LITERAL)
    }

    /// Whether a required field counts as present: non-empty, non-zero and
    /// not the `"undefined"` placeholder.
    fn is_present(&self) -> bool {
        match self {
            FieldValue::Text(s) => !s.is_empty() && s != UNDEFINED_LITERAL,
            FieldValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Number(n.into())
    }
}

/// Render a number as JavaScript's `Number.prototype.toString` does, which is
/// what a template literal produces on the signing side.
///
/// Integers print in full. Floats use the shortest round-trip digits,
/// positional for decimal exponents in `-6..21` and `d.ddde±x` outside it.
/// `-0` prints as `0`.
fn render_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) => render_js_float(f),
        None => n.to_string(),
    }
}

fn render_js_float(f: f64) -> String {
    if f == 0.0 {
        return "0".into();
    }
    if !f.is_finite() {
        return if f.is_nan() {
            "NaN".into()
        } else if f > 0.0 {
            "Infinity".into()
        } else {
            "-Infinity".into()
        };
    }
    if f < 0.0 {
        return format!("-{}", render_js_float(-f));
    }

    // `{:e}` yields the shortest round-trip digits, e.g. `1.2345e-7`.
    let scientific = format!("{f:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return f.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return f.to_string();
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    // Value is 0.<digits> x 10^n.
    let n = exponent + 1;

    if k <= n && n <= 21 {
        format!("{digits}{}", "0".repeat((n - k) as usize))
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        format!("{int}.{frac}")
    } else if -6 < n && n <= 0 {
        format!("0.{}{digits}", "0".repeat((-n) as usize))
    } else {
        let sign = if n - 1 < 0 { '-' } else { '+' };
        let (lead, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{lead}e{sign}{}", (n - 1).abs())
        } else {
            format!("{lead}.{rest}e{sign}{}", (n - 1).abs())
        }
    }
}

/// String-keyed login payload, including the signature field.
///
/// Keys are kept sorted, so iteration order is the canonical order.
/// `Debug` output lists field names only.
#[derive(Clone, Default, PartialEq)]
pub struct SignedPayload {
    fields: BTreeMap<String, FieldValue>,
}

impl SignedPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Build a payload from a JSON object. `null` values count as absent;
    /// booleans, arrays and nested objects are rejected.
    pub fn from_json(value: &Value) -> Result<Self, Rejection> {
        let object = value
            .as_object()
            .ok_or_else(|| Rejection::Malformed("<payload>".into()))?;
        Self::from_json_map(object)
    }

    pub fn from_json_map(object: &serde_json::Map<String, Value>) -> Result<Self, Rejection> {
        let mut payload = Self::new();
        for (key, value) in object {
            match value {
                Value::Null => {}
                Value::String(s) => payload.insert(key.clone(), s.as_str()),
                Value::Number(n) => payload.insert(key.clone(), FieldValue::Number(n.clone())),
                Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
                    return Err(Rejection::Malformed(key.clone()))
                }
            }
        }
        Ok(payload)
    }

    /// Parse an `application/x-www-form-urlencoded` query string, as the
    /// login widget sends it on redirect. All values are text.
    pub fn from_query(query: &str) -> Result<Self, Rejection> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|_| Rejection::Malformed("<query>".into()))?;
        Ok(pairs.into_iter().collect())
    }
}

impl<K, V> FromIterator<(K, V)> for SignedPayload
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Self::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}

impl fmt::Debug for SignedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedPayload")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Canonicalization and signing
// ─────────────────────────────────────────────────────────────────────────────

/// Build the check-string that is fed to the HMAC.
pub fn check_string(payload: &SignedPayload) -> String {
    payload
        .fields
        .iter()
        .filter(|(key, value)| key.as_str() != SIGNATURE_FIELD && !value.is_undefined())
        .map(|(key, value)| format!("{key}={}", value.render()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `SHA256(secret)`, the HMAC key.
fn derive_signing_key(secret: &[u8]) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(Sha256::digest(secret).into())
}

fn hex_hmac(key: &[u8], message: &str) -> Option<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).ok()?;
    mac.update(message.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Reference signer: the lowercase hex signature a payload must carry.
pub fn sign(payload: &SignedPayload, secret: &[u8]) -> String {
    let key = derive_signing_key(secret);
    // HMAC accepts keys of any length, so this cannot fail.
    hex_hmac(&key[..], &check_string(payload)).unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Verifier
// ─────────────────────────────────────────────────────────────────────────────

/// Why a payload was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{0}` has an unsupported value")]
    Malformed(String),

    #[error("auth_date is outside the accepted window")]
    Expired,

    #[error("signature could not be computed")]
    HashFailure,

    #[error("signature mismatch")]
    SignatureMismatch,
}

/// Verifies signed login payloads against a shared secret.
///
/// The secret is injected once; only its SHA-256 digest is retained.
pub struct SignedPayloadVerifier {
    signing_key: Zeroizing<[u8; 32]>,
    max_age: Option<Duration>,
    observer: Arc<dyn VerificationObserver>,
}

impl SignedPayloadVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            signing_key: derive_signing_key(secret),
            max_age: None,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn from_secret(secret: &SecretString) -> Self {
        Self::new(secret.expose_secret().as_bytes())
    }

    /// Also require `auth_date` to lie within `max_age` of the current time.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn VerificationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Accept or reject a payload. Never panics; anything doubtful is `false`.
    pub fn verify(&self, payload: &SignedPayload) -> bool {
        self.check(payload).is_ok()
    }

    /// Like [`verify`](Self::verify), starting from raw JSON.
    pub fn verify_json(&self, value: &Value) -> bool {
        match SignedPayload::from_json(value) {
            Ok(payload) => self.verify(&payload),
            Err(reason) => {
                self.observer.record(&VerificationEvent {
                    outcome: Outcome::Rejected(&reason),
                    field_names: Vec::new(),
                    subject: None,
                });
                false
            }
        }
    }

    pub fn check(&self, payload: &SignedPayload) -> Result<(), Rejection> {
        self.check_at(payload, chrono::Utc::now().timestamp())
    }

    /// Decide at an explicit unix time `now` and report the outcome.
    pub fn check_at(&self, payload: &SignedPayload, now: i64) -> Result<(), Rejection> {
        let result = self.evaluate(payload, now);

        let field_names = payload
            .field_names()
            .filter(|name| *name != SIGNATURE_FIELD)
            .collect();
        let event = match &result {
            Ok(()) => VerificationEvent {
                outcome: Outcome::Accepted,
                field_names,
                subject: payload.get(ID_FIELD).map(FieldValue::render),
            },
            Err(reason) => VerificationEvent {
                outcome: Outcome::Rejected(reason),
                field_names,
                subject: None,
            },
        };
        self.observer.record(&event);

        result
    }

    fn evaluate(&self, payload: &SignedPayload, now: i64) -> Result<(), Rejection> {
        for field in REQUIRED_FIELDS {
            if !payload.get(field).is_some_and(FieldValue::is_present) {
                return Err(Rejection::MissingField(field));
            }
        }

        if let Some(max_age) = self.max_age {
            let auth_date = payload
                .get(AUTH_DATE_FIELD)
                .filter(|v| !v.is_undefined())
                .ok_or(Rejection::MissingField(AUTH_DATE_FIELD))?
                .as_i64()
                .ok_or_else(|| Rejection::Malformed(AUTH_DATE_FIELD.into()))?;
            let window = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            if now.saturating_sub(auth_date) > window || auth_date.saturating_sub(now) > window {
                return Err(Rejection::Expired);
            }
        }

        let provided = payload
            .get(SIGNATURE_FIELD)
            .map(FieldValue::render)
            .ok_or(Rejection::MissingField(SIGNATURE_FIELD))?;

        let expected = hex_hmac(&self.signing_key[..], &check_string(payload))
            .ok_or(Rejection::HashFailure)?;

        if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
            Ok(())
        } else {
            Err(Rejection::SignatureMismatch)
        }
    }
}

impl fmt::Debug for SignedPayloadVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedPayloadVerifier")
            .field("signing_key", &"[REDACTED]")
            .field("max_age", &self.max_age)
            .finish()
    }
}
