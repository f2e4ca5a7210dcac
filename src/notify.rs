//! Display collaborator seam.
//!
//! The pipeline and envelope layer only decide *whether* and *what* to
//! display; the host application decides *how* by registering a [`Notifier`].

use tracing::{error, info, warn};

/// How a success or error outcome should be presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// Blocking dialog.
    Modal,
    /// Inline toast/message.
    #[default]
    Message,
    /// No visible notification.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

/// Presentation collaborator. Implementations must be cheap and non-blocking;
/// the pipeline calls this inline on its own task.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity, mode: DisplayMode);
}

/// Default notifier that routes everything to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, severity: Severity, mode: DisplayMode) {
        match severity {
            Severity::Success => info!(?mode, "{message}"),
            Severity::Warning => warn!(?mode, "{message}"),
            Severity::Error => error!(?mode, "{message}"),
        }
    }
}
