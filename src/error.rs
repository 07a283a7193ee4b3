//! Error types for acquisition control.
//!
//! All errors implement `std::error::Error` and carry enough structured context for a
//! host application to decide how to recover.
//!
//! ## Error Categories
//!
//! - **Precondition Errors**: the caller asked for a transition the current state does
//!   not allow (start while running, start with a fault pending, acquire while
//!   disconnected)
//! - **Recoverable Faults**: a fault raised by the producer side and surfaced once on
//!   the next poll (continuity gaps, driver exceptions, device disconnects)
//! - **Driver Errors**: a synchronous driver call (scan, connect, start) failed
//! - **Configuration Errors**: invalid acquisition parameters or unreadable config files
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use biostream::{AcquisitionError, Fault};
//!
//! let error = AcquisitionError::RecoverableFault {
//!     fault: Fault::Continuity { expected: 3, received: 5 },
//! };
//! assert!(!error.requires_force_stop());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::fault::Fault;

/// Result type alias for acquisition operations.
pub type Result<T, E = AcquisitionError> = std::result::Result<T, E>;

/// Main error type for acquisition operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AcquisitionError {
    #[error("Cannot {operation}: {reason}")]
    PreconditionFailed { operation: String, reason: String },

    #[error("Acquisition fault pending: {fault}")]
    RecoverableFault { fault: Fault },

    #[error("Device driver failed during {operation}: {reason}")]
    Driver {
        operation: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    #[error("Invalid acquisition configuration: {details}")]
    InvalidConfig { details: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration parse error: {details}")]
    ConfigParse { details: String },

    #[error("Failed to spawn {thread} thread")]
    Thread {
        thread: String,
        #[source]
        source: std::io::Error,
    },
}

impl AcquisitionError {
    /// Returns whether the failed operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            AcquisitionError::PreconditionFailed { .. } => false,
            AcquisitionError::RecoverableFault { fault } => !fault.is_terminal(),
            AcquisitionError::Driver { .. } => true,
            AcquisitionError::Timeout { .. } => true,
            AcquisitionError::InvalidConfig { .. } => false,
            AcquisitionError::ConfigFile { .. } => false,
            AcquisitionError::ConfigParse { .. } => false,
            AcquisitionError::Thread { .. } => true,
        }
    }

    /// Returns whether the running session should be torn down with a forced stop.
    ///
    /// True for faults after which the driver can no longer be trusted to answer a
    /// graceful interrupt handshake.
    pub fn requires_force_stop(&self) -> bool {
        matches!(self, AcquisitionError::RecoverableFault { fault } if fault.is_terminal())
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            AcquisitionError::PreconditionFailed { .. } => vec![
                "Stop the running acquisition before starting a new one",
                "Poll pending faults before restarting",
                "Connect to a device before acquiring",
            ],
            AcquisitionError::RecoverableFault { fault } if fault.is_terminal() => vec![
                "Force-stop the acquisition",
                "Disconnect and reconnect the device",
                "Check the device battery and radio range",
            ],
            AcquisitionError::RecoverableFault { .. } => vec![
                "Continue polling, the acquisition is still running",
                "Lower the sampling rate if gaps persist",
            ],
            AcquisitionError::Driver { .. } => vec![
                "Ensure the device is powered on and in range",
                "Verify the device address",
                "Retry the operation",
            ],
            AcquisitionError::Timeout { .. } => vec![
                "Increase the configured timeout",
                "Check that the device is still responding",
            ],
            AcquisitionError::InvalidConfig { .. } => vec![
                "Check the sampling rate and resolution",
                "Check the active channel numbers for this device",
            ],
            AcquisitionError::ConfigFile { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
            AcquisitionError::ConfigParse { .. } => vec![
                "Check the YAML syntax",
                "Compare field names against the documented configuration",
            ],
            AcquisitionError::Thread { .. } => vec![
                "Check system thread limits",
                "Retry after other sessions have shut down",
            ],
        }
    }

    /// Helper constructor for precondition failures.
    pub fn precondition(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        AcquisitionError::PreconditionFailed { operation: operation.into(), reason: reason.into() }
    }

    /// Helper constructor for driver failures.
    pub fn driver(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        AcquisitionError::Driver { operation: operation.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for driver failures with source.
    pub fn driver_with_source(
        operation: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        AcquisitionError::Driver {
            operation: operation.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for configuration validation errors.
    pub fn invalid_config(details: impl Into<String>) -> Self {
        AcquisitionError::InvalidConfig { details: details.into() }
    }

    /// Helper constructor for timeouts.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        AcquisitionError::Timeout { operation: operation.into(), duration }
    }
}

impl From<serde_yaml_ng::Error> for AcquisitionError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        AcquisitionError::ConfigParse { details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DisconnectReason;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            operation in "\\w+",
            reason in ".*",
            expected in 0i64..1_000_000,
            received in 0i64..1_000_000,
            millis in 1u64..60_000u64
          ) {
            let precondition = AcquisitionError::precondition(operation.clone(), reason.clone());
            let msg = precondition.to_string();
            prop_assert!(msg.contains(&operation));
            prop_assert!(msg.contains(&reason));

            let gap = AcquisitionError::RecoverableFault {
              fault: Fault::Continuity { expected, received },
            };
            let msg = gap.to_string();
            prop_assert!(msg.contains(&expected.to_string()));
            prop_assert!(msg.contains(&received.to_string()));

            let timeout = AcquisitionError::timeout(operation.clone(), Duration::from_millis(millis));
            prop_assert!(timeout.to_string().contains(&operation));
          }

          #[test]
          fn only_terminal_faults_require_force_stop(
            code in any::<i32>(),
            message in ".*",
            seq in any::<i64>()
          ) {
            let driver = AcquisitionError::RecoverableFault {
              fault: Fault::Driver { code, message: message.clone() },
            };
            prop_assert!(driver.requires_force_stop());
            prop_assert!(!driver.is_retryable());

            let rejected = AcquisitionError::RecoverableFault {
              fault: Fault::InvalidPackage { seq },
            };
            prop_assert!(!rejected.requires_force_stop());
            prop_assert!(rejected.is_retryable());
          }

          #[test]
          fn driver_error_source_chain_is_preserved(base_message in ".+") {
            let source: Box<dyn std::error::Error + Send + Sync> =
              Box::new(std::io::Error::other(base_message.clone()));
            let error = AcquisitionError::driver_with_source("connect", "link refused", source);

            let inner = std::error::Error::source(&error).map(|s| s.to_string());
            prop_assert_eq!(inner, Some(base_message));
          }
        }
    }

    #[test]
    fn error_constructors_validation() {
        let precondition = AcquisitionError::precondition("start", "already running");
        assert!(matches!(precondition, AcquisitionError::PreconditionFailed { .. }));

        let driver = AcquisitionError::driver("scan", "adapter off");
        assert!(matches!(driver, AcquisitionError::Driver { source: None, .. }));

        let config = AcquisitionError::invalid_config("sampling rate must be positive");
        assert!(matches!(config, AcquisitionError::InvalidConfig { .. }));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<AcquisitionError>();

        let error = AcquisitionError::precondition("start", "test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let disconnect = AcquisitionError::RecoverableFault {
            fault: Fault::Disconnected { reason: DisconnectReason::BatteryDischarged },
        };
        let precondition = AcquisitionError::precondition("start", "running");
        let driver = AcquisitionError::driver("connect", "unreachable");

        assert!(disconnect.requires_force_stop());
        assert!(!disconnect.is_retryable());
        assert!(!precondition.is_retryable());
        assert!(driver.is_retryable());

        for error in [&disconnect, &precondition, &driver] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }

    #[test]
    fn yaml_errors_convert_to_parse_errors() {
        let err = serde_yaml_ng::from_str::<u32>("not: [a number").unwrap_err();
        let converted: AcquisitionError = err.into();
        assert!(matches!(converted, AcquisitionError::ConfigParse { .. }));
    }
}
