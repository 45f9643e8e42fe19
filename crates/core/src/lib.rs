//! Document Panel Core Library
//!
//! Ties the panel together: a registry of open documents kept in sync with
//! the host's views, thumbnail panels that hold entries in the shared
//! [`ThumbnailCache`], batch jobs that walk the host's views one at a time,
//! and the [`PanelContext`] that drives all of it from a timer queue the
//! host pumps.
//!
//! The host application is reached only through the [`ViewHost`] and
//! [`DocumentHandle`] traits.

pub mod batch;
pub mod context;
pub mod error;
pub mod host;
pub mod panel;
pub mod registry;
pub mod settings;

pub use batch::{
    BatchJob, BatchOperation, BatchOutcome, BatchState, ViewBatchProcessor, DEFAULT_MAX_ITERATIONS,
};
pub use context::{BatchId, PanelConfig, PanelContext, PanelTask};
pub use error::{CoreError, CoreResult};
pub use host::{
    DocumentHandle, FileStatus, HostRenderers, ViewHost, ViewId, ViewInfo, WindowId,
};
pub use panel::{PaintItem, ThumbnailPanel};
pub use registry::{
    DocumentRecord, DocumentRef, DocumentRegistry, RegistryChanges, RegistryConfig,
};
pub use settings::{
    Settings, SettingsError, KEY_LAYOUT_LANES, KEY_LAYOUT_POLICY, KEY_LAYOUT_SPACING,
    KEY_LAYOUT_STRETCH, KEY_ORIENTATION,
};

pub use docpanel_cache::{
    CacheEvent, ConsumerId, DocumentId, ThumbnailCache, ThumbnailKey,
};
