//! Errors raised by the panel core

use crate::host::ViewId;
use crate::settings::SettingsError;
use docpanel_cache::{CacheError, DocumentId};

/// Errors that can occur while maintaining the panel
///
/// Every error is scoped to one document, view, or job; none of them is
/// fatal to the panel as a whole.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The document is no longer open
    #[error("document not found: {0}")]
    UnknownDocument(DocumentId),

    /// The view was closed before it could be used
    #[error("view no longer exists: {0}")]
    StaleView(ViewId),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Result type for panel operations
pub type CoreResult<T> = Result<T, CoreError>;
