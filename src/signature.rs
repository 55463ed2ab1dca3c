//! Keyed signature over an IPN parameter set.
//!
//! Digistore24 signs each notification server-side: the parameters are
//! sorted, concatenated as `KEY=VALUE` with the raw passphrase appended
//! after every pair, and the whole string is hashed with SHA-512. Any
//! deviation from that canonical form produces a different digest, so the
//! steps here follow it bit for bit.

use crate::{Error, Passphrase, Payload, Value};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha512};

/// The signature field this crate emits
pub const SIGN_KEY: &str = "sha_sign";

/// Legacy spelling still sent by older provider configurations
pub const LEGACY_SIGN_KEY: &str = "SHASIGN";

/// Canonicalization switches; both default to off.
///
/// `upper_case_keys` uppercases every key before sorting and emitting it,
/// which makes the sort effectively case-insensitive. `html_decode`
/// decodes HTML entities in values before hashing, for payloads that were
/// entity-encoded in transit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub upper_case_keys: bool,
    pub html_decode: bool,
}

/// Compute the expected signature for a parameter set
///
/// # Errors
///
/// Returns an error when the passphrase or the parameter set is empty
pub fn compute(passphrase: &Passphrase, payload: &Payload, options: Options) -> Result<String, Error> {
    let key = &passphrase.expose_secret().0;
    if key.is_empty() {
        return Err(Error::EmptyPassphrase);
    }
    if payload.is_empty() {
        return Err(Error::EmptyParameters);
    }
    // the signature fields never contribute to their own digest
    let mut pairs: Vec<(String, &Value)> = payload
        .iter()
        .filter(|(name, _)| name.as_str() != SIGN_KEY && name.as_str() != LEGACY_SIGN_KEY)
        .map(|(name, value)| {
            let name = if options.upper_case_keys {
                name.to_uppercase()
            } else {
                name.clone()
            };
            (name, value)
        })
        .collect();
    // ordinal sort on the emitted key; sort key and output share the case
    // transform
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let mut material = String::new();
    for (name, value) in pairs {
        if value.is_blank() {
            continue;
        }
        let rendered = value.as_wire();
        let rendered = if options.html_decode {
            html_escape::decode_html_entities(rendered.as_ref()).into_owned()
        } else {
            rendered.into_owned()
        };
        material.push_str(&name);
        material.push('=');
        material.push_str(&rendered);
        material.push_str(key);
    }
    let mut hasher = Sha512::new();
    hasher.update(material.as_bytes());
    Ok(format!("{:X}", hasher.finalize()))
}

/// Verify the signature carried by an inbound payload.
///
/// The received value is read from [`SIGN_KEY`] first, then
/// [`LEGACY_SIGN_KEY`]. Comparison is byte exact; a digest that differs
/// only in hex case does not validate.
///
/// # Errors
///
/// Returns an error when no signature was received or it does not match
pub fn validate(passphrase: &Passphrase, payload: &Payload, options: Options) -> Result<(), Error> {
    let received = payload
        .get(SIGN_KEY)
        .or_else(|| payload.get(LEGACY_SIGN_KEY))
        .filter(|value| !value.is_blank())
        .ok_or(Error::MissingSignature)?
        .as_wire()
        .into_owned();
    let expected = compute(passphrase, payload, options)?;
    if received != expected {
        return Err(Error::SignatureMismatch { received, expected });
    }
    Ok(())
}

/// Sign an outbound parameter set, returning the `(key, digest)` pair to
/// merge into it. The key is always the lowercase [`SIGN_KEY`] spelling.
///
/// # Errors
///
/// Returns an error when the passphrase or the parameter set is empty
pub fn sign(passphrase: &Passphrase, payload: &Payload, options: Options) -> Result<(String, String), Error> {
    let digest = compute(passphrase, payload, options)?;
    Ok((SIGN_KEY.to_owned(), digest))
}
