use std::path::PathBuf;

/// Errors that can occur across the Triago platform.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use triago_core::TriagoError;
///
/// let err = TriagoError::Config("bug_fixed_days must not be zero".into());
/// assert!(err.to_string().contains("bug_fixed_days"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum TriagoError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bug tracker REST API failure.
    #[error("tracker error: {0}")]
    Http(String),

    /// SQLite operation failure.
    #[error("database error: {0}")]
    Database(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A query for a known project returned no rows.
    #[error("no data: {0}")]
    NoData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TriagoError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = TriagoError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn no_data_names_the_query() {
        let err = TriagoError::NoData("candidate edges for project 3".into());
        assert!(err.to_string().contains("project 3"));
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = TriagoError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert!(err.to_string().contains("/tmp/missing.toml"));
    }
}
