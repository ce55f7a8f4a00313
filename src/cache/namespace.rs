//! Key namespacing
//!
//! Maps logical keys onto fully-qualified storage keys so several logical
//! caches can share one shared-tier instance. Prefix disjointness is the
//! operator's responsibility.

/// Deterministic logical-key → storage-key mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyNamespacer {
    prefix: String,
}

impl KeyNamespacer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Configured prefix
    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fully-qualified key for `logical_key`
    pub fn namespace(&self, logical_key: &str) -> String {
        let mut full = String::with_capacity(self.prefix.len() + logical_key.len());
        full.push_str(&self.prefix);
        full.push_str(logical_key);
        full
    }

    /// Logical key for a fully-qualified key carrying this prefix
    pub fn strip<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        full_key.strip_prefix(self.prefix.as_str())
    }

    /// Shared-tier glob selecting the candidates for [`matches`](Self::matches)
    ///
    /// Without a pattern this is the whole namespace. With one it is every
    /// key containing the pattern, since the pattern may overlap the prefix;
    /// scan results still have to go through `matches`.
    pub fn scan_pattern(&self, pattern: Option<&str>) -> String {
        match pattern.filter(|p| !p.is_empty()) {
            None => {
                let mut glob = escape_glob(&self.prefix);
                glob.push('*');
                glob
            }
            Some(pattern) => format!("*{}*", escape_glob(pattern)),
        }
    }

    /// Whether `full_key` belongs to this namespace and contains `pattern`
    ///
    /// Same rule the memory tier applies: substring match on the
    /// fully-qualified key, prefix included.
    pub fn matches(&self, full_key: &str, pattern: Option<&str>) -> bool {
        full_key.starts_with(self.prefix.as_str()) && full_key.contains(pattern.unwrap_or(""))
    }
}

/// Escape Redis glob metacharacters
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Tests
// =============================================================================
