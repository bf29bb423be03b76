use crate::models::pressure::Trigger;
use std::io;
use std::path::PathBuf;

/// Errors raised by pressure monitors and trigger notifiers.
///
/// Every failure is scoped to the monitor or notifier that hit it.
#[derive(Debug, thiserror::Error)]
pub enum PsiError {
    /// The pressure report could not be opened (no PSI support, no permission).
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path:   PathBuf,
        source: io::Error,
    },

    /// Reading or rewinding the report failed. Safe to retry.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path:   PathBuf,
        source: io::Error,
    },

    /// A report line did not have the expected five fields.
    #[error("malformed pressure line: {line:?}")]
    Format { line: String },

    /// The kernel refused the trigger, or the trigger descriptor could not be set up.
    #[error("failed to register trigger '{trigger}' on {}: {source}", path.display())]
    TriggerRegistration {
        path:    PathBuf,
        trigger: Trigger,
        source:  io::Error,
    },

    /// The background wait kept failing and the notifier gave up.
    #[error("waiting on {} failed {attempts} times in a row: {reason}", path.display())]
    Wait {
        path:     PathBuf,
        attempts: u32,
        reason:   String,
    },
}
