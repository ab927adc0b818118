// Deterministic cache key construction
// Author: kelexine (https://github.com/kelexine)

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Key identifying one cacheable request.
///
/// Layout: `kind:hash[:attr=value...]` with attributes sorted by name, so the
/// same kind, content and attributes always produce the same key. `%`, `:`
/// and `=` inside the kind, names and values are percent-encoded, so distinct
/// inputs never collapse into the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn builder(kind: impl Into<String>) -> CacheKeyBuilder {
        CacheKeyBuilder {
            kind: kind.into(),
            hasher: Sha256::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Wrap an already-built key string.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub struct CacheKeyBuilder {
    kind: String,
    hasher: Sha256,
    attributes: BTreeMap<String, String>,
}

impl CacheKeyBuilder {
    /// Feed request content into the hash. Parts are length-prefixed so
    /// `("ab", "c")` and `("a", "bc")` hash differently.
    pub fn content(mut self, part: impl AsRef<[u8]>) -> Self {
        let bytes = part.as_ref();
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Context attribute such as language or output format.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> CacheKey {
        let digest = self.hasher.finalize();
        let mut key = format!("{}:{}", escape(&self.kind), hex::encode(&digest[..16]));
        for (name, value) in &self.attributes {
            key.push(':');
            key.push_str(&escape(name));
            key.push('=');
            key.push_str(&escape(value));
        }
        CacheKey(key)
    }
}

fn escape(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for ch in component.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '=' => escaped.push_str("%3D"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_generation() {
        let key1 = CacheKey::builder("explain")
            .content("fn main() {}")
            .attribute("language", "rust")
            .build();
        let key2 = CacheKey::builder("explain")
            .content("fn main() {}")
            .attribute("language", "rust")
            .build();

        // Same inputs should produce same key
        assert_eq!(key1, key2);

        // Different kind should produce different key
        let key3 = CacheKey::builder("review")
            .content("fn main() {}")
            .attribute("language", "rust")
            .build();
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let a = CacheKey::builder("k")
            .attribute("language", "rust")
            .attribute("format", "markdown")
            .build();
        let b = CacheKey::builder("k")
            .attribute("format", "markdown")
            .attribute("language", "rust")
            .build();
        assert_eq!(a, b);
        assert!(a.as_str().ends_with(":format=markdown:language=rust"));
    }

    #[test]
    fn test_content_parts_are_length_prefixed() {
        let a = CacheKey::builder("k").content("ab").content("c").build();
        let b = CacheKey::builder("k").content("a").content("bc").build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_separators_inside_attributes_are_escaped() {
        let packed = CacheKey::builder("explain")
            .content("fn main() {}")
            .attribute("format", "json:language=rust")
            .build();
        let split = CacheKey::builder("explain")
            .content("fn main() {}")
            .attribute("format", "json")
            .attribute("language", "rust")
            .build();
        assert_ne!(packed, split);
        assert!(packed.as_str().ends_with(":format=json%3Alanguage%3Drust"));

        let name_a = CacheKey::builder("k").attribute("a=b", "c").build();
        let name_b = CacheKey::builder("k").attribute("a", "b=c").build();
        assert_ne!(name_a, name_b);
    }

    #[test]
    fn test_separator_inside_kind_is_escaped() {
        let a = CacheKey::builder("review:strict").content("x").build();
        let b = CacheKey::builder("review").content("x").build();
        assert!(a.as_str().starts_with("review%3Astrict:"));
        assert_ne!(a, b);

        let percent = CacheKey::builder("k").attribute("v", "%3A").build();
        let colon = CacheKey::builder("k").attribute("v", ":").build();
        assert_ne!(percent, colon);
    }

    #[test]
    fn test_key_layout() {
        let key = CacheKey::builder("complete").content("x").build();
        let (kind, hash) = key.as_str().split_once(':').unwrap();
        assert_eq!(kind, "complete");
        assert_eq!(hash.len(), 32);
    }
}
