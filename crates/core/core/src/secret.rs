//! Validation key retrieval.
//!
//! The key is fetched through a [`SecretSource`] on every call that needs it,
//! so a rotated secret takes effect without a restart. Implementations must
//! not cache on behalf of the core.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{ValidationError, ValidationResult};

/// A shared signing secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidationKey(String);

impl ValidationKey {
    /// Wraps a key, returning `None` for an empty or blank value.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the raw key material.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ValidationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ValidationKey(<redacted>)")
    }
}

/// Source of the webhook validation key.
///
/// `Ok(None)` means "no key configured" and lets the caller report
/// `SigningKeyMissing`; `Err` means the source itself failed.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetches the current key.
    async fn validation_key(&self) -> ValidationResult<Option<ValidationKey>>;
}

/// A key held in configuration. Development and testing only.
#[derive(Debug, Clone, Default)]
pub struct StaticSecret {
    key: Option<ValidationKey>,
}

impl StaticSecret {
    /// Creates a source that always returns `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: ValidationKey::new(key),
        }
    }

    /// Creates a source with no key configured.
    pub fn none() -> Self {
        Self { key: None }
    }
}

#[async_trait]
impl SecretSource for StaticSecret {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn validation_key(&self) -> ValidationResult<Option<ValidationKey>> {
        Ok(self.key.clone())
    }
}

/// Reads the key from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvSecret {
    variable: String,
}

impl EnvSecret {
    /// Creates a source reading `variable`.
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }
}

#[async_trait]
impl SecretSource for EnvSecret {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn validation_key(&self) -> ValidationResult<Option<ValidationKey>> {
        match std::env::var(&self.variable) {
            Ok(value) => Ok(ValidationKey::new(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(ValidationError::internal(format!(
                "environment variable {} is not valid unicode",
                self.variable
            ))),
        }
    }
}

/// Reads the key from a file on every call, e.g. a secret mounted by a vault agent.
///
/// Surrounding whitespace is trimmed. A missing file means no key.
#[derive(Debug, Clone)]
pub struct FileSecret {
    path: PathBuf,
}

impl FileSecret {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretSource for FileSecret {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn validation_key(&self) -> ValidationResult<Option<ValidationKey>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(ValidationKey::new(content.trim())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ValidationError::internal(format!(
                "failed to read validation key from {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_debug_is_redacted() {
        let key = ValidationKey::new("hunter2").unwrap();
        assert!(!format!("{:?}", key).contains("hunter2"));
        assert_eq!(key.expose(), "hunter2");
    }

    #[test]
    fn test_blank_key_is_none() {
        assert!(ValidationKey::new("").is_none());
        assert!(ValidationKey::new("   ").is_none());
    }

    #[tokio::test]
    async fn test_static_secret() {
        let source = StaticSecret::new("k");
        assert_eq!(source.validation_key().await.unwrap().unwrap().expose(), "k");
        assert!(StaticSecret::none().validation_key().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_env_secret_rereads_each_call() {
        let var = "GRIDHOOK_TEST_SECRET_ROTATION";
        let source = EnvSecret::new(var);

        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::remove_var(var) };
        assert!(source.validation_key().await.unwrap().is_none());

        unsafe { std::env::set_var(var, "first") };
        assert_eq!(source.validation_key().await.unwrap().unwrap().expose(), "first");

        unsafe { std::env::set_var(var, "second") };
        assert_eq!(source.validation_key().await.unwrap().unwrap().expose(), "second");

        unsafe { std::env::remove_var(var) };
    }

    #[tokio::test]
    async fn test_file_secret() {
        let path = std::env::temp_dir().join(format!("gridhook-key-{}", std::process::id()));
        let source = FileSecret::new(&path);

        let _ = std::fs::remove_file(&path);
        assert!(source.validation_key().await.unwrap().is_none());

        std::fs::write(&path, "rotated-key\n").unwrap();
        assert_eq!(
            source.validation_key().await.unwrap().unwrap().expose(),
            "rotated-key"
        );

        std::fs::remove_file(&path).unwrap();
    }
}
