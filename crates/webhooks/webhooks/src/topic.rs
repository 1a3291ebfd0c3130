//! Topic allow-list.

use gridhook_core::{ValidationError, ValidationResult};

/// Allow-list of topic prefixes.
///
/// A topic is authorized iff it starts with at least one configured prefix,
/// ignoring case. There is no wildcard, regex or path normalisation:
/// `/a/b` also admits `/a/bc`, and `/a/b/` does not admit `/a/b`.
#[derive(Debug, Clone, Default)]
pub struct TopicAllowList {
    /// Lowercased prefixes; blank entries are dropped.
    prefixes: Vec<String>,
}

impl TopicAllowList {
    /// Creates an allow-list from configured prefixes.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    /// Creates an empty allow-list that authorizes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if no prefix is configured.
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Returns the number of configured prefixes.
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Returns true if `topic` is authorized.
    pub fn is_authorized(&self, topic: &str) -> bool {
        self.authorize(topic).is_ok()
    }

    /// Authorizes `topic`, reporting why it was refused.
    pub fn authorize(&self, topic: &str) -> ValidationResult<()> {
        if self.prefixes.is_empty() {
            return Err(ValidationError::NoAllowListConfigured);
        }

        let topic_lower = topic.to_lowercase();
        if self.prefixes.iter().any(|p| topic_lower.starts_with(p.as_str())) {
            Ok(())
        } else {
            Err(ValidationError::TopicNotAllowed {
                topic: topic.to_string(),
            })
        }
    }
}
