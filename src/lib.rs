//! Rust support for Digistore24's Instant Payment Notifications.
//!
//! Digistore24 reports order events to your server by posting a flat,
//! form-encoded key/value payload to your IPN endpoint. Every payload is
//! signed with a passphrase you configure in the vendor backend; the
//! signature must be verified before any field is acted upon. Details
//! about the IPN connection are explained on [this page].
//!
//! [this page]: https://docs.digistore24.com/ipn
//!
//! The intended call order per request is: [`parse_form`] →
//! [`signature::validate`] → [`Notification::decode`] → your business
//! logic → [`ResponseBuilder::serialize`]. Decoding is a pure parse and
//! does not verify the signature for you.
//!
//! # Usage
//!
//! See [demos].
//!
//! [demos]: https://github.com/rushmorem/digistore24/tree/main/demos

pub mod convert;
pub mod notification;
pub mod response;
pub mod signature;

pub use notification::{BillingStatus, Event, Notification, PayMethod, Salutation};
pub use response::ResponseBuilder;

use rust_decimal::Decimal;
use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret, Zeroize};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

/// IPN passphrase
pub type Passphrase = Secret<Key>;

/// Passphrase material as configured in the Digistore24 vendor backend
#[derive(Clone, Serialize, Deserialize, Eq, Ord, PartialEq, PartialOrd)]
pub struct Key(pub(crate) String);

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Zeroize for Key {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl CloneableSecret for Key {}
impl DebugSecret for Key {}
impl SerializableSecret for Key {}

/// A loosely typed scalar as delivered over the wire.
///
/// Form-encoded payloads only ever produce strings, but callers relaying
/// payloads through JSON may hand over numbers, booleans or an
/// already-split tag list; all of them decode through the same rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl Value {
    /// A blank value never contributes to a signature and decodes to `None`.
    ///
    /// `0` and `"0"` are not blank; zero is significant.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::String(s) => s.is_empty(),
            Value::Int(..) | Value::Float(..) => false,
            Value::List(list) => list.is_empty(),
        }
    }

    /// Render the value the way it appears on the wire
    #[must_use]
    pub fn as_wire(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed(""),
            // the provider casts booleans the loose way
            Value::Bool(b) => Cow::Borrowed(if *b { "1" } else { "" }),
            Value::Int(n) => Cow::Owned(n.to_string()),
            Value::Float(f) => Cow::Owned(f.to_string()),
            Value::String(s) => Cow::Borrowed(s),
            Value::List(list) => Cow::Owned(list.join(",")),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value)
    }
}

/// One inbound IPN payload, keyed by wire field name
pub type Payload = HashMap<String, Value>;

/// Parse a form-encoded request body into a [`Payload`]
///
/// # Errors
///
/// Returns an error when the body is not valid form encoding
pub fn parse_form(body: &str) -> Result<Payload, Error> {
    let fields: HashMap<String, String> =
        serde_urlencoded::from_str(body).map_err(Error::MalformedPayload)?;
    Ok(fields
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect())
}

/// Error returned by this crate
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("passphrase must not be empty")]
    EmptyPassphrase,
    #[error("cannot sign an empty parameter set")]
    EmptyParameters,
    #[error("no signature received")]
    MissingSignature,
    #[error("signature mismatch; received {received}, expected {expected}")]
    SignatureMismatch { received: String, expected: String },
    #[error("payload is not valid form encoding")]
    MalformedPayload(#[source] serde_urlencoded::de::Error),
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("`{0}` is not a recognised date/time")]
    InvalidDateTime(String),
    #[error("thank-you URL is invalid")]
    InvalidThankyouUrl(#[source] url::ParseError),
    #[error("`{0}` is a reserved response key")]
    ReservedKey(String),
    #[error("login block {0} has an empty field")]
    IncompleteLoginBlock(usize),
    #[error("`{0}` must not be negative, got {1}")]
    NegativeAmount(&'static str, Decimal),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_body_becomes_string_payload() {
        let payload = parse_form("event=on_payment&order_id=ABC-123&amount_brutto=99.99").unwrap();
        assert_eq!(payload.len(), 3);
        assert_eq!(payload["event"], Value::String("on_payment".into()));
        assert_eq!(payload["amount_brutto"], Value::String("99.99".into()));
    }

    #[test]
    fn blankness_skips_false_and_empty_but_not_zero() {
        assert!(Value::Null.is_blank());
        assert!(Value::from("").is_blank());
        assert!(Value::from(false).is_blank());
        assert!(!Value::from(0).is_blank());
        assert!(!Value::from("0").is_blank());
    }

    #[test]
    fn wire_rendering() {
        assert_eq!(Value::from(true).as_wire(), "1");
        assert_eq!(Value::from(42).as_wire(), "42");
        assert_eq!(Value::List(vec!["a".into(), "b".into()]).as_wire(), "a,b");
    }
}
