use log::{error, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Something the user must be told about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Saved,
    SaveFailed(String),
    /// Save attempted on a document with no persistence id. Retrying will not help.
    NotPersisted,
    LoadFailed(String),
    NothingToExport,
    UploadFailed(String),
}

impl Notice {
    /// Everything except a successful save is reported as a problem.
    pub fn is_error(&self) -> bool {
        !matches!(self, Notice::Saved)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Saved => write!(f, "Changes saved to the server"),
            Notice::SaveFailed(reason) => write!(f, "Failed to save changes: {}", reason),
            Notice::NotPersisted => write!(f, "This document has no server id and cannot be saved"),
            Notice::LoadFailed(reason) => write!(f, "Failed to load the document: {}", reason),
            Notice::NothingToExport => write!(f, "No data available for export"),
            Notice::UploadFailed(reason) => {
                write!(f, "Some files could not be processed: {}", reason)
            }
        }
    }
}

/// Where user-facing notices go (an alert, a toast, a response body).
pub trait Notifier {
    fn notify(&self, notice: Notice);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}

/// Writes notices to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        if !notice.is_error() {
            info!("{}", notice);
            return;
        }
        match notice {
            Notice::NotPersisted | Notice::NothingToExport => warn!("{}", notice),
            _ => error!("{}", notice),
        }
    }
}

/// Keeps every notice, for callers that report them later.
#[derive(Clone, Debug, Default)]
pub struct NoticeLog {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        LogNotifier.notify(notice.clone());
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_saved_is_not_an_error() {
        assert!(!Notice::Saved.is_error());
        assert!(Notice::NotPersisted.is_error());
        assert!(Notice::NothingToExport.is_error());
        assert!(Notice::SaveFailed("timeout".to_string()).is_error());
    }

    #[test]
    fn notice_log_keeps_order_until_drained() {
        let log = NoticeLog::new();
        log.notify(Notice::Saved);
        log.notify(Notice::LoadFailed("gone".to_string()));

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(!drained[0].is_error());
        assert!(drained[1].is_error());
        assert!(log.notices().is_empty());
    }
}
