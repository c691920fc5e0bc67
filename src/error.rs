//! # Error Types
//!
//! All errors raised while composing or performing a score.
//!
//! Invariant violations are treated as programming errors in the composing or
//! performing layer: they are detected at construction (or at the point of
//! assignment) and returned straight to the caller. Nothing here is retried,
//! because the engine performs no I/O of its own.
//!
//! ## Error Types
//! - `StructuralInconsistency` - sequence/track invariants violated
//! - `InvalidRange` - a pitch, velocity, volume, channel or duration out of bounds
//! - `UnknownClefType` - a clef identifier outside the eight-symbol vocabulary
//! - `MisconfiguredOptions` - volume control without bounds, or claimed twice
//! - `UnsupportedOperation` - e.g. changing the duration of a zero-duration marker
//! - `ConfigError` - a YAML document that could not be read
//!
//! ## Usage
//! ```rust
//! use seqtrk::{ClefType, ScoreError};
//!
//! match "x".parse::<ClefType>() {
//!     Err(ScoreError::UnknownClefType(id)) => assert_eq!(id, "x"),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// A sequence or track invariant does not hold.
    ///
    /// # Example
    /// ```
    /// # use seqtrk::ScoreError;
    /// let err = ScoreError::StructuralInconsistency("no track begins at position 0".to_string());
    /// assert_eq!(err.to_string(), "Structural inconsistency: no track begins at position 0");
    /// ```
    #[error("Structural inconsistency: {0}")]
    StructuralInconsistency(String),

    /// A numeric value lies outside its documented bounds.
    ///
    /// # Example
    /// ```
    /// # use seqtrk::ScoreError;
    /// let err = ScoreError::InvalidRange { what: "pitch".to_string(), value: 200, min: 0, max: 127 };
    /// assert_eq!(err.to_string(), "Invalid pitch: 200 (expected 0..=127)");
    /// ```
    #[error("Invalid {what}: {value} (expected {min}..={max})")]
    InvalidRange {
        what: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Unknown clef type: {0:?}")]
    UnknownClefType(String),

    #[error("Misconfigured track options: {0}")]
    MisconfiguredOptions(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid score document: {0}")]
    ConfigError(String),
}

impl ScoreError {
    pub(crate) fn range(what: &str, value: i64, min: i64, max: i64) -> Self {
        ScoreError::InvalidRange {
            what: what.to_string(),
            value,
            min,
            max,
        }
    }

    pub(crate) fn structure(message: impl Into<String>) -> Self {
        ScoreError::StructuralInconsistency(message.into())
    }
}

/// Checks that `value` lies in `min..=max`.
pub(crate) fn check_range(what: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min || value > max {
        return Err(ScoreError::range(what, value, min, max));
    }
    Ok(())
}

pub type Result<T> = std::result::Result<T, ScoreError>;
