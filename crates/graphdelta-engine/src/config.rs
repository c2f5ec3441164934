//! Tracker configuration
//!
//! Every section has serde defaults, so an empty document is a valid
//! configuration:
//!
//! ```toml
//! [logging]
//! profile = "production"
//!
//! [merge]
//! strict_identifiers = true
//!
//! [apply]
//! validate_shape = true
//! ```

use graphdelta_core::errors::{ExError, ExErrorKind};
use graphdelta_core::logging_facility::{self, Profile};
use graphdelta_core::{ApplyOptions, MergeOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub profile: Profile,
}

/// Options for one [`ChangeTracker`](crate::ChangeTracker)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub logging: LoggingConfig,
    pub merge: MergeOptions,
    pub apply: ApplyOptions,
}

impl TrackerConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the document is not valid TOML or a value has
    /// the wrong type.
    pub fn from_toml_str(source: &str) -> Result<Self, ExError> {
        toml::from_str(source).map_err(|e| {
            ExError::new(ExErrorKind::InvalidInput)
                .with_op("load_config")
                .with_message(e.to_string())
        })
    }

    /// Install the global subscriber for the configured profile
    pub fn init_logging(&self) {
        logging_facility::init(self.logging.profile);
    }
}
