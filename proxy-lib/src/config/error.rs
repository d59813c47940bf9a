use std::fmt;

/// Rejected configuration input.
///
/// Returned before any state is touched.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    NotFinite {
        field: &'static str,
    },
    NotPositive {
        field: &'static str,
    },
    InvalidUrl {
        value: String,
        reason: &'static str,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                if max.is_infinite() {
                    write!(f, "{field} must be >= {min} (got {value})")
                } else {
                    write!(f, "{field} must be within [{min}, {max}] (got {value})")
                }
            }
            ValidationError::NotFinite { field } => write!(f, "{field} must be a finite number"),
            ValidationError::NotPositive { field } => write!(f, "{field} must be positive"),
            ValidationError::InvalidUrl { value, reason } => {
                write!(f, "invalid target url '{value}': {reason}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}
