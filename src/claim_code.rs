//! Claim-code derivation.
//!
//! A claim code is a short, typeable handle for a claim, derived from the
//! order id: `RYFT-` followed by the first two and last two alphanumeric
//! characters of the id. Codes are a convenience lookup key, not a
//! uniqueness guarantee; two orders can share one.

use rand::prelude::*;

use crate::config::CLAIM_CODE_PREFIX;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Strip every character that is not ASCII alphanumeric.
pub fn sanitize(order_id: &str) -> String {
    order_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Derive the claim code for an order id.
///
/// Deterministic whenever the sanitized id has at least four characters;
/// shorter ids get a random four-character suffix.
pub fn generate(order_id: &str) -> String {
    let clean = sanitize(order_id);
    let suffix = match edges(&clean) {
        Some(edges) => edges.to_ascii_uppercase(),
        None => random_suffix(&mut rand::thread_rng(), CODE_ALPHABET),
    };
    format!("{}-{}", CLAIM_CODE_PREFIX, suffix)
}

/// Normalize user-typed code input before lookup.
pub fn normalize_code_input(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Whether the input looks like a claim code rather than an order id.
pub fn is_claim_code(input: &str) -> bool {
    normalize_code_input(input).starts_with(&format!("{}-", CLAIM_CODE_PREFIX))
}

/// Lowercase slug naming the delivery channel of an order, e.g. `ryft-4e93`.
///
/// Falls back to a random slug when the id is too short or looks like an
/// error string that leaked in from a failed upstream call.
pub fn channel_slug(order_id: &str) -> String {
    let clean = sanitize(order_id).to_ascii_lowercase();
    let suffix = match edges(&clean) {
        Some(edges) if !clean.contains("failed") && !clean.contains("error") => edges,
        _ => random_suffix(&mut rand::thread_rng(), SLUG_ALPHABET),
    };
    format!("{}-{}", CLAIM_CODE_PREFIX.to_ascii_lowercase(), suffix)
}

/// First two plus last two characters, if there are at least four.
fn edges(clean: &str) -> Option<String> {
    let len = clean.len();
    (len >= 4).then(|| format!("{}{}", &clean[..2], &clean[len - 2..]))
}

fn random_suffix<R: Rng>(rng: &mut R, alphabet: &[u8]) -> String {
    (0..4)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}
