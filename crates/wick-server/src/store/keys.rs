use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random secret key of `length` characters drawn from
/// `[A-Za-z0-9]`. `thread_rng` is cryptographically secure, so at the
/// default length of 16 the keys are unguessable in practice.
pub(crate) fn generate(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Whether `candidate` could have come out of [`generate`]: non-empty,
/// ASCII alphanumeric only. Lets the routing layer bounce junk paths
/// without a store lookup.
pub(crate) fn looks_like_key(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// First few characters of a key for log lines. Full keys are the only
/// handle to their secrets and never appear in logs.
pub(crate) fn key_prefix(key: &str) -> &str {
    key.get(..4).unwrap_or(key)
}
