use thiserror::Error;

/// Top-level error type for the PropChat system.
///
/// Subsystem crates either use this directly or define their own error type
/// with a `From<PropChatError>` impl so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PropChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for PropChatError {
    fn from(err: toml::de::Error) -> Self {
        PropChatError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PropChatError {
    fn from(err: toml::ser::Error) -> Self {
        PropChatError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PropChatError {
    fn from(err: serde_json::Error) -> Self {
        PropChatError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for PropChat operations.
pub type Result<T> = std::result::Result<T, PropChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(PropChatError, &str)> = vec![
            (
                PropChatError::Config("bad key".to_string()),
                "Configuration error: bad key",
            ),
            (
                PropChatError::Storage("disk full".to_string()),
                "Storage error: disk full",
            ),
            (
                PropChatError::Query("bad filter".to_string()),
                "Query error: bad filter",
            ),
            (
                PropChatError::Schema("no attributes".to_string()),
                "Schema error: no attributes",
            ),
            (
                PropChatError::Llm("rate limited".to_string()),
                "LLM error: rate limited",
            ),
            (
                PropChatError::Auth("Invalid login credentials".to_string()),
                "Authentication error: Invalid login credentials",
            ),
            (
                PropChatError::Api("bind failed".to_string()),
                "API error: bind failed",
            ),
            (
                PropChatError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PropChatError = io_err.into();
        assert!(matches!(err, PropChatError::Io(_)));
        assert!(err.to_string().starts_with("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let converted: PropChatError = err.unwrap_err().into();
        assert!(matches!(converted, PropChatError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let converted: PropChatError = err.unwrap_err().into();
        assert!(matches!(converted, PropChatError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let value = io_result?;
            Ok(value.to_string())
        }

        assert_eq!(inner().unwrap(), "42");
    }
}
