//! Contracts the host application fulfils
//!
//! The panel never owns documents, views, or windows. It sees them through
//! these traits, all called on the host's single scheduling thread.

use docpanel_cache::{DocumentId, RendererLookup};
use docpanel_render::RegionRenderer;
use std::fmt;

/// Host identity of a view onto a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(pub u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Host identity of a top-level window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// One open view, as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewInfo {
    pub view: ViewId,
    pub document: DocumentId,
    pub window: WindowId,
}

/// Whether a file can be inspected right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// The host is still writing it; ask again later
    Busy,
    Ready,
}

/// An open document
pub trait DocumentHandle: RegionRenderer {
    fn id(&self) -> DocumentId;

    fn title(&self) -> String;

    /// Path or name of the backing file; `None` for unsaved documents
    fn file_name(&self) -> Option<String>;

    /// Has unsaved changes
    fn modified(&self) -> bool;

    /// This handle as a plain renderer
    fn as_renderer(&self) -> &dyn RegionRenderer;
}

/// The host application: its views, windows, actions, and files
pub trait ViewHost {
    /// Every open view, in the host's own order
    fn views(&self) -> Vec<ViewInfo>;

    /// Resolve a document; `None` once it is closed
    fn document(&self, id: DocumentId) -> Option<&dyn DocumentHandle>;

    /// Make `view` the active view; `false` if it no longer exists
    fn activate_view(&mut self, view: ViewId) -> bool;

    /// Bring `window` to the front
    fn raise_window(&mut self, window: WindowId);

    /// Fire a named command (save, close, revert...) at the active view
    fn invoke_action(&mut self, action: &str);

    fn file_status(&self, file_name: &str) -> FileStatus;
}

/// Lets the cache drive progressive renders through the host's documents
pub struct HostRenderers<'a>(pub &'a dyn ViewHost);

impl RendererLookup for HostRenderers<'_> {
    fn renderer(&self, document: DocumentId) -> Option<&dyn RegionRenderer> {
        self.0.document(document).map(|handle| handle.as_renderer())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory host used by the unit tests

    use super::*;
    use docpanel_render::{PixelRect, RenderResult};
    use image::{Rgba, RgbaImage};
    use std::cell::Cell;
    use std::collections::HashMap;

    pub struct FakeDocument {
        pub id: DocumentId,
        pub size: (u32, u32),
        pub title: String,
        pub file_name: Option<String>,
        pub modified: bool,
        pub renders: Cell<u32>,
    }

    impl FakeDocument {
        pub fn new(id: u64, width: u32, height: u32) -> Self {
            Self {
                id: DocumentId(id),
                size: (width, height),
                title: format!("Document {id}"),
                file_name: Some(format!("/tmp/doc{id}.kra")),
                modified: false,
                renders: Cell::new(0),
            }
        }
    }

    impl RegionRenderer for FakeDocument {
        fn source_size(&self) -> (u32, u32) {
            self.size
        }

        fn render_region(&self, region: PixelRect) -> RenderResult<RgbaImage> {
            self.renders.set(self.renders.get() + 1);
            Ok(RgbaImage::from_pixel(region.width, region.height, Rgba([1, 2, 3, 255])))
        }

        fn render_thumbnail(&self, width: u32, height: u32) -> RenderResult<RgbaImage> {
            self.renders.set(self.renders.get() + 1);
            Ok(RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255])))
        }
    }

    impl DocumentHandle for FakeDocument {
        fn id(&self) -> DocumentId {
            self.id
        }

        fn title(&self) -> String {
            self.title.clone()
        }

        fn file_name(&self) -> Option<String> {
            self.file_name.clone()
        }

        fn modified(&self) -> bool {
            self.modified
        }

        fn as_renderer(&self) -> &dyn RegionRenderer {
            self
        }
    }

    /// Host whose "close" action closes the active view
    #[derive(Default)]
    pub struct FakeHost {
        pub documents: HashMap<DocumentId, FakeDocument>,
        pub views: Vec<ViewInfo>,
        pub active: Option<ViewId>,
        pub raised: Vec<WindowId>,
        pub actions: Vec<(String, Option<ViewId>)>,
        pub busy_checks: Cell<u32>,
    }

    impl FakeHost {
        pub fn open(&mut self, document: FakeDocument, views: &[(u64, u64)]) {
            for (view, window) in views {
                self.views.push(ViewInfo {
                    view: ViewId(*view),
                    document: document.id,
                    window: WindowId(*window),
                });
            }
            self.documents.insert(document.id, document);
        }

        pub fn close_view(&mut self, view: ViewId) {
            self.views.retain(|info| info.view != view);
            let live: Vec<_> = self.views.iter().map(|info| info.document).collect();
            self.documents.retain(|id, _| live.contains(id));
            if self.active == Some(view) {
                self.active = None;
            }
        }
    }

    impl ViewHost for FakeHost {
        fn views(&self) -> Vec<ViewInfo> {
            self.views.clone()
        }

        fn document(&self, id: DocumentId) -> Option<&dyn DocumentHandle> {
            self.documents.get(&id).map(|doc| doc as &dyn DocumentHandle)
        }

        fn activate_view(&mut self, view: ViewId) -> bool {
            let exists = self.views.iter().any(|info| info.view == view);
            if exists {
                self.active = Some(view);
            }
            exists
        }

        fn raise_window(&mut self, window: WindowId) {
            self.raised.push(window);
        }

        fn invoke_action(&mut self, action: &str) {
            self.actions.push((action.to_string(), self.active));
            if action == "close" {
                if let Some(view) = self.active {
                    self.close_view(view);
                }
            }
        }

        fn file_status(&self, _file_name: &str) -> FileStatus {
            let remaining = self.busy_checks.get();
            if remaining > 0 {
                self.busy_checks.set(remaining - 1);
                FileStatus::Busy
            } else {
                FileStatus::Ready
            }
        }
    }
}
