//! Registry of documents that have at least one open view
//!
//! The host's view notifications only say that *something* changed, and the
//! host's own bookkeeping may lag them by a scheduler turn. The registry
//! therefore debounces notifications into a single deferred
//! [`refresh`](DocumentRegistry::refresh) that rebuilds the live view set and
//! diffs it against the known documents.

use crate::host::{DocumentHandle, ViewHost, WindowId};
use docpanel_cache::DocumentId;
use docpanel_scheduler::{Debouncer, TimerId, TimerQueue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

/// Registry timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Delay between a view notification and the refresh; zero means the
    /// next scheduler turn
    pub refresh_delay_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { refresh_delay_ms: 0 }
    }
}

/// What the registry knows about one open document
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    id: DocumentId,
    created_at: Instant,
    order: u64,
    title: String,
    file_name: Option<String>,
    modified: bool,
    source_size: (u32, u32),
    views_per_window: BTreeMap<WindowId, usize>,
}

impl DocumentRecord {
    fn new(handle: &dyn DocumentHandle, order: u64) -> Self {
        Self {
            id: handle.id(),
            created_at: Instant::now(),
            order,
            title: handle.title(),
            file_name: handle.file_name(),
            modified: handle.modified(),
            source_size: handle.source_size(),
            views_per_window: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Position in creation order
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn source_size(&self) -> (u32, u32) {
        self.source_size
    }

    /// Zero-area documents (closing, or not loaded yet) must not be rendered
    pub fn has_area(&self) -> bool {
        self.source_size.0 > 0 && self.source_size.1 > 0
    }

    pub fn view_count(&self) -> usize {
        self.views_per_window.values().sum()
    }

    pub fn view_count_in(&self, window: WindowId) -> usize {
        self.views_per_window.get(&window).copied().unwrap_or(0)
    }

    pub fn windows(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.views_per_window.keys().copied()
    }
}

/// A document as callers may hold it: a live host handle or a registry record
#[derive(Clone, Copy)]
pub enum DocumentRef<'a> {
    Handle(&'a dyn DocumentHandle),
    Record(&'a DocumentRecord),
}

impl DocumentRef<'_> {
    pub fn id(&self) -> DocumentId {
        match self {
            DocumentRef::Handle(handle) => handle.id(),
            DocumentRef::Record(record) => record.id(),
        }
    }
}

impl<'a> From<&'a DocumentRecord> for DocumentRef<'a> {
    fn from(record: &'a DocumentRecord) -> Self {
        DocumentRef::Record(record)
    }
}

/// Differences found by one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryChanges {
    pub added: Vec<DocumentId>,
    pub removed: Vec<DocumentId>,
    /// Documents whose unsaved-changes flag flipped
    pub modified_changed: Vec<DocumentId>,
    /// Documents whose title or file name changed
    pub renamed: Vec<DocumentId>,
    /// Documents whose source size changed; their thumbnails are stale
    pub resized: Vec<DocumentId>,
}

impl RegistryChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified_changed.is_empty()
            && self.renamed.is_empty()
            && self.resized.is_empty()
    }
}

#[derive(Debug)]
pub struct DocumentRegistry {
    records: HashMap<DocumentId, DocumentRecord>,
    refresh: Debouncer,
    next_order: u64,
}

impl DocumentRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            records: HashMap::new(),
            refresh: Debouncer::new(config.refresh_delay_ms),
            next_order: 0,
        }
    }

    /// Schedule a refresh in response to a host notification
    ///
    /// Bursts of notifications collapse into one refresh.
    pub fn schedule_refresh<T>(&mut self, timers: &mut TimerQueue<T>, task: T) -> TimerId {
        self.refresh.trigger(timers, task)
    }

    /// Whether `timer` is the currently scheduled refresh
    ///
    /// Consumes the pending refresh when it is.
    pub fn refresh_due(&mut self, timer: TimerId) -> bool {
        self.refresh.fired(timer)
    }

    pub fn refresh_pending(&self) -> bool {
        self.refresh.is_pending()
    }

    /// Rebuild the view set from the host and diff it against known documents
    ///
    /// `before_remove` runs for every document that lost its last view while
    /// its record still exists, so dependents can release what they hold for
    /// it. The record is deleted afterwards.
    pub fn refresh(
        &mut self,
        host: &dyn ViewHost,
        mut before_remove: impl FnMut(&DocumentRecord),
    ) -> RegistryChanges {
        let mut changes = RegistryChanges::default();
        let mut live: HashMap<DocumentId, BTreeMap<WindowId, usize>> = HashMap::new();
        for info in host.views() {
            *live.entry(info.document).or_default().entry(info.window).or_default() += 1;
        }

        let mut live_ids: Vec<_> = live.keys().copied().collect();
        live_ids.sort();
        let mut resolved = HashSet::new();
        for id in live_ids {
            let Some(handle) = host.document(id) else {
                log::warn!("host reports views of {} but cannot resolve it", id);
                continue;
            };
            resolved.insert(id);
            let views_per_window = live.remove(&id).unwrap_or_default();

            match self.records.get_mut(&id) {
                Some(record) => {
                    record.views_per_window = views_per_window;
                    Self::update_record(record, handle, &mut changes);
                }
                None => {
                    let mut record = DocumentRecord::new(handle, self.next_order);
                    record.views_per_window = views_per_window;
                    self.next_order += 1;
                    log::info!("tracking {} ({})", id, record.title);
                    self.records.insert(id, record);
                    changes.added.push(id);
                }
            }
        }

        let mut gone: Vec<_> = self
            .records
            .keys()
            .filter(|id| !resolved.contains(*id))
            .copied()
            .collect();
        gone.sort();
        for id in gone {
            if let Some(record) = self.records.get(&id) {
                before_remove(record);
            }
            self.records.remove(&id);
            log::info!("stopped tracking {}", id);
            changes.removed.push(id);
        }

        changes
    }

    fn update_record(
        record: &mut DocumentRecord,
        handle: &dyn DocumentHandle,
        changes: &mut RegistryChanges,
    ) {
        let modified = handle.modified();
        if modified != record.modified {
            record.modified = modified;
            changes.modified_changed.push(record.id);
        }

        let (title, file_name) = (handle.title(), handle.file_name());
        if title != record.title || file_name != record.file_name {
            record.title = title;
            record.file_name = file_name;
            changes.renamed.push(record.id);
        }

        let size = handle.source_size();
        if size != record.source_size {
            log::debug!("{} resized {:?} -> {:?}", record.id, record.source_size, size);
            record.source_size = size;
            changes.resized.push(record.id);
        }
    }

    pub fn get(&self, id: DocumentId) -> Option<&DocumentRecord> {
        self.records.get(&id)
    }

    /// Record for a handle or record reference, if still tracked
    pub fn resolve(&self, document: DocumentRef<'_>) -> Option<&DocumentRecord> {
        self.records.get(&document.id())
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.records.contains_key(&id)
    }

    /// Records in creation order
    pub fn records(&self) -> Vec<&DocumentRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by_key(|record| record.order);
        records
    }

    /// Documents backed by `file_name`
    pub fn documents_with_file(&self, file_name: &str) -> Vec<DocumentId> {
        let mut ids: Vec<_> = self
            .records
            .values()
            .filter(|record| record.file_name.as_deref() == Some(file_name))
            .map(|record| record.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{FakeDocument, FakeHost};
    use crate::host::ViewId;

    fn host_with_two_documents() -> FakeHost {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(1, 800, 600), &[(10, 1), (11, 2), (12, 2)]);
        host.open(FakeDocument::new(2, 400, 400), &[(20, 1)]);
        host
    }

    #[test]
    fn test_refresh_tracks_new_documents() {
        let host = host_with_two_documents();
        let mut registry = DocumentRegistry::default();

        let changes = registry.refresh(&host, |_| {});

        assert_eq!(changes.added, vec![DocumentId(1), DocumentId(2)]);
        let record = registry.get(DocumentId(1)).unwrap();
        assert_eq!(record.view_count(), 3);
        assert_eq!(record.view_count_in(WindowId(2)), 2);
        assert_eq!(record.windows().collect::<Vec<_>>(), vec![WindowId(1), WindowId(2)]);
        assert_eq!(record.file_name(), Some("/tmp/doc1.kra"));
        assert!(registry.refresh(&host, |_| {}).is_empty());
    }

    #[test]
    fn test_removal_notifies_before_deleting() {
        let mut host = host_with_two_documents();
        let mut registry = DocumentRegistry::default();
        registry.refresh(&host, |_| {});

        host.close_view(ViewId(20));
        let mut notified = Vec::new();
        let changes = registry.refresh(&host, |record| notified.push(record.id()));

        assert_eq!(notified, vec![DocumentId(2)]);
        assert_eq!(changes.removed, vec![DocumentId(2)]);
        assert!(!registry.contains(DocumentId(2)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_closing_one_of_several_views_keeps_record() {
        let mut host = host_with_two_documents();
        let mut registry = DocumentRegistry::default();
        registry.refresh(&host, |_| {});

        host.close_view(ViewId(11));
        let changes = registry.refresh(&host, |_| panic!("nothing should be removed"));

        assert!(changes.removed.is_empty());
        assert_eq!(registry.get(DocumentId(1)).unwrap().view_count_in(WindowId(2)), 1);
    }

    #[test]
    fn test_refresh_reports_state_changes() {
        let mut host = host_with_two_documents();
        let mut registry = DocumentRegistry::default();
        registry.refresh(&host, |_| {});

        if let Some(doc) = host.documents.get_mut(&DocumentId(1)) {
            doc.modified = true;
            doc.size = (1600, 1200);
        }
        if let Some(doc) = host.documents.get_mut(&DocumentId(2)) {
            doc.title = "Renamed".to_string();
        }
        let changes = registry.refresh(&host, |_| {});

        assert_eq!(changes.modified_changed, vec![DocumentId(1)]);
        assert_eq!(changes.resized, vec![DocumentId(1)]);
        assert_eq!(changes.renamed, vec![DocumentId(2)]);
        assert!(registry.get(DocumentId(1)).unwrap().is_modified());
        assert_eq!(registry.get(DocumentId(2)).unwrap().title(), "Renamed");
    }

    #[test]
    fn test_records_keep_creation_order() {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(9, 10, 10), &[(1, 1)]);
        let mut registry = DocumentRegistry::default();
        registry.refresh(&host, |_| {});
        host.open(FakeDocument::new(3, 10, 10), &[(2, 1)]);
        registry.refresh(&host, |_| {});

        let ids: Vec<_> = registry.records().iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![DocumentId(9), DocumentId(3)]);
        assert!(registry.records()[0].created_at() <= registry.records()[1].created_at());
    }

    #[test]
    fn test_resolve_handle_and_record() {
        let host = host_with_two_documents();
        let mut registry = DocumentRegistry::default();
        registry.refresh(&host, |_| {});

        let handle = host.document(DocumentId(2)).unwrap();
        let by_handle = registry.resolve(DocumentRef::Handle(handle)).unwrap();
        let by_record = registry.resolve(by_handle.into()).unwrap();
        assert_eq!(by_record.id(), DocumentId(2));
        assert_eq!(registry.documents_with_file("/tmp/doc2.kra"), vec![DocumentId(2)]);
    }

    #[test]
    fn test_notifications_collapse_into_one_refresh() {
        let mut timers: TimerQueue<&str> = TimerQueue::new();
        let mut registry = DocumentRegistry::default();

        let first = registry.schedule_refresh(&mut timers, "refresh");
        let second = registry.schedule_refresh(&mut timers, "refresh");
        assert_eq!(timers.pending(), 1);

        assert!(!registry.refresh_due(first));
        let (fired, _) = timers.pop_due().unwrap();
        assert_eq!(fired, second);
        assert!(registry.refresh_due(fired));
        assert!(!registry.refresh_pending());
    }
}
