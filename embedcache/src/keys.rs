/// Build the KV key for the cache metadata row (model + token).
/// Format: `{prefix}:meta`
pub fn meta_key(prefix: &str) -> String {
    format!("{prefix}:meta")
}

/// Build the KV key for one cached vector.
/// Format: `{prefix}:emb:{fingerprint}:{identity}`
///
/// The fingerprint is fixed-width hex, so identities containing `:` do not
/// make keys ambiguous.
pub fn entry_key(prefix: &str, fingerprint: &str, identity: &str) -> String {
    format!("{prefix}:emb:{fingerprint}:{identity}")
}

/// Return the KV prefix for listing all cached vectors.
/// Format: `{prefix}:emb:`
pub fn entry_prefix(prefix: &str) -> String {
    format!("{prefix}:emb:")
}

/// Build the KV key for a remembered embedding failure.
/// Format: `{prefix}:fail:{fingerprint}`
pub fn failure_key(prefix: &str, fingerprint: &str) -> String {
    format!("{prefix}:fail:{fingerprint}")
}

/// Return the KV prefix for listing remembered failures.
/// Format: `{prefix}:fail:`
pub fn failure_prefix(prefix: &str) -> String {
    format!("{prefix}:fail:")
}
