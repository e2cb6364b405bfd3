//! Error types for the table extraction library.
//!
//! Only configuration-shape problems and malformed input are errors. Failing to
//! find a label, a header or a key row is an ordinary outcome and is reported
//! through empty results or [`crate::table::PageOutcome::Skipped`].

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while loading configuration or input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A header definition or rule references a type missing from `header_types`
    #[error("Header '{header}' references unknown header type '{header_type}'")]
    UnknownHeaderType {
        /// Definition, rule or binding that holds the reference
        header: String,
        /// The unknown type name
        header_type: String,
    },

    /// No header type is flagged as a prime key
    #[error("Configuration has no prime-key header type")]
    MissingPrimeKey,

    /// Any other configuration shape problem
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configured regular expression failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern text
        pattern: String,
        /// Compiler error
        #[source]
        source: regex::Error,
    },

    /// A raw OCR record matches neither the quad nor the ltrb tuple shape
    #[error("Invalid node item '{id}': {reason}")]
    InvalidNodeItem {
        /// Identifier of the record in the input map
        id: String,
        /// Reason for rejection
        reason: String,
    },

    /// No registered processor supports the document class
    #[error("No processor registered for document class '{0}'")]
    UnknownDocumentClass(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// True for errors that describe a defect in the configuration itself.
    pub fn is_config_inconsistency(&self) -> bool {
        matches!(
            self,
            Error::UnknownHeaderType { .. }
                | Error::MissingPrimeKey
                | Error::InvalidConfig(_)
                | Error::InvalidPattern { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_header_type_error() {
        let err = Error::UnknownHeaderType {
            header: "qty".to_string(),
            header_type: "QUANTITY".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("qty"));
        assert!(msg.contains("QUANTITY"));
        assert!(err.is_config_inconsistency());
    }

    #[test]
    fn test_invalid_node_item_error() {
        let err = Error::InvalidNodeItem {
            id: "7".to_string(),
            reason: "too short".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("'7'"));
        assert!(msg.contains("too short"));
        assert!(!err.is_config_inconsistency());
    }

    #[test]
    fn test_invalid_pattern_keeps_source() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = Error::InvalidPattern {
            pattern: "(".to_string(),
            source,
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.is_config_inconsistency());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
