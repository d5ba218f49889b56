//! Error types for welcome-core operations.

// ═══════════════════════════════════════════════════════════════════════════════
// Internal Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur while loading the directory or reconciling
/// entries against the registry.
#[derive(Debug, thiserror::Error)]
pub enum WelcomeError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    /// Missing or malformed startup parameter. Fatal: no cycle is started.
    #[error("Configuration error: {field}: {reason}")]
    Configuration { field: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Directory Errors
    // ─────────────────────────────────────────────────────────────────────
    /// A directory load failed. The cycle is abandoned and retried on the
    /// next scheduled tick.
    #[error("Failed to load {source_name}: {details}")]
    DirectoryFetch {
        source_name: String,
        details: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Reconciliation Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Registry {operation} failed: {details}")]
    Registry { operation: String, details: String },
}

impl WelcomeError {
    pub fn configuration(field: &str, reason: impl Into<String>) -> Self {
        WelcomeError::Configuration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn directory(source_name: &str, details: impl Into<String>) -> Self {
        WelcomeError::DirectoryFetch {
            source_name: source_name.to_string(),
            details: details.into(),
        }
    }

    pub fn registry(operation: &str, details: impl Into<String>) -> Self {
        WelcomeError::Registry {
            operation: operation.to_string(),
            details: details.into(),
        }
    }

    /// True for failures the next scheduled cycle may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, WelcomeError::DirectoryFetch { .. })
    }
}

/// Convenience type alias for Results using WelcomeError.
pub type Result<T> = std::result::Result<T, WelcomeError>;

// Conversion for string error compatibility
impl From<WelcomeError> for String {
    fn from(err: WelcomeError) -> String {
        err.to_string()
    }
}
