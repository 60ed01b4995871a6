use thiserror::Error;

/// Main error type for the throughput lab.
///
/// Only sweep-level failures live here. Anything that happens inside a cell
/// is absorbed into that cell's [`crate::CellResult`].
#[derive(Error, Debug)]
pub enum LtError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(#[from] InvalidGridError),

    #[error("Storage write error: {0}")]
    StorageWrite(#[from] StorageWriteError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Malformed axis input. Fatal: the sweep never starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidGridError {
    #[error("axis '{axis}' has no values")]
    EmptyAxis { axis: String },

    #[error("axis '{axis}' contains non-positive value {value}")]
    NonPositiveValue { axis: String, value: i64 },

    #[error("axis '{axis}' lists value {value} more than once")]
    DuplicateValue { axis: String, value: i64 },

    #[error("grid size overflows: {message}")]
    Overflow { message: String },
}

/// Failure to persist a row of the authoritative record. Fatal.
#[derive(Error, Debug)]
pub enum StorageWriteError {
    #[error("failed to create record at {path}: {message}")]
    Create { path: String, message: String },

    #[error("failed to append row for {point}: {message}")]
    Append { point: String, message: String },

    #[error("failed to read record at {path}: {message}")]
    Read { path: String, message: String },
}

/// Result type alias for sweep-level operations
pub type LtResult<T> = Result<T, LtError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::LtError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = InvalidGridError::NonPositiveValue {
            axis: "batch".to_string(),
            value: -4,
        };

        assert!(error.to_string().contains("batch"));
        assert!(error.to_string().contains("-4"));
    }

    #[test]
    fn test_error_conversion() {
        let grid_error = InvalidGridError::EmptyAxis {
            axis: "instances".to_string(),
        };
        let lt_error: LtError = grid_error.into();

        match lt_error {
            LtError::InvalidGrid(_) => (),
            _ => panic!("Expected InvalidGrid error"),
        }
    }

    #[test]
    fn test_config_macro() {
        let config_err = config_error!("Missing required field: {}", "model_id");
        assert_eq!(
            config_err.to_string(),
            "Configuration error: Missing required field: model_id"
        );
    }
}
