//! Escaping of keys that NGSI-LD reserves for its own use.
//!
//! Free-form attribute names such as `id` or `@context` would collide with the
//! entity structure on the wire. They are prefixed with [`ESCAPE_PREFIX`] when
//! produced and stripped again when consumed.

/// Keys with a fixed meaning in NGSI-LD.
pub const RESERVED_WORDS: [&str; 8] = [
    "id", "@id", "value", "@value", "type", "@type", "context", "@context",
];

/// Prefix marking an escaped key.
pub const ESCAPE_PREFIX: &str = "tmfEscaped-";

/// Stateless codec for reserved wire keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservedWordCodec;

impl ReservedWordCodec {
    /// Whether the key is one of the reserved words.
    pub fn is_reserved(key: &str) -> bool {
        RESERVED_WORDS.contains(&key)
    }

    /// Whether the key carries the escape prefix.
    pub fn is_escaped(key: &str) -> bool {
        key.starts_with(ESCAPE_PREFIX)
    }

    /// Escapes a reserved key, leaving every other key untouched.
    pub fn escape(key: &str) -> String {
        if Self::is_reserved(key) {
            format!("{ESCAPE_PREFIX}{key}")
        } else {
            key.to_string()
        }
    }

    /// Strips the escape prefix, if present.
    pub fn unescape(key: &str) -> String {
        key.strip_prefix(ESCAPE_PREFIX).unwrap_or(key).to_string()
    }
}
