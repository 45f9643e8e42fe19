//! Process-wide panel state and its scheduler loop
//!
//! [`PanelContext`] owns the registry, the thumbnail cache, the settings and
//! every open panel, and turns host notifications into tasks on a
//! [`TimerQueue`]. The host pumps the queue from its event loop: it advances
//! the clock and calls [`PanelContext::run_due`], which runs each due task to
//! completion. Long work (progressive renders, batch jobs) reschedules itself
//! one step at a time so the host stays responsive.
//!
//! Errors never leave a task: they are logged and the task is dropped.

use crate::batch::{BatchJob, ViewBatchProcessor, DEFAULT_MAX_ITERATIONS};
use crate::error::{CoreError, CoreResult};
use crate::host::{FileStatus, HostRenderers, ViewHost, ViewId, WindowId};
use crate::panel::{PaintItem, ThumbnailPanel};
use crate::registry::{DocumentRegistry, RegistryChanges, RegistryConfig};
use crate::settings::Settings;
use docpanel_cache::{CacheEvent, ConsumerId, DocumentId, ThumbnailCache};
use docpanel_layout::LayoutParams;
use docpanel_scheduler::{TimerId, TimerQueue};
use std::collections::{HashMap, HashSet};

pub type BatchId = u64;

/// Work items on the panel's timer queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelTask {
    /// Re-read the host's views (debounced)
    RegistryRefresh,
    /// Advance every progressive render by one block
    GeneratorStep,
    /// Advance one batch job by one step
    BatchStep(BatchId),
    /// See whether a just-saved file can be read yet
    SaveStatusCheck { file_name: String },
}

/// Timing and limits of the scheduler loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelConfig {
    pub registry: RegistryConfig,
    /// Delay between progressive render steps
    pub generator_step_delay_ms: u64,
    /// Delay before re-checking a file the host is still writing
    pub save_retry_delay_ms: u64,
    /// Iteration cap for batch jobs that do not set their own
    pub batch_max_iterations: u32,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            generator_step_delay_ms: 0,
            save_retry_delay_ms: 100,
            batch_max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

pub struct PanelContext {
    config: PanelConfig,
    timers: TimerQueue<PanelTask>,
    registry: DocumentRegistry,
    cache: ThumbnailCache,
    settings: Settings,
    panels: Vec<ThumbnailPanel>,
    batches: HashMap<BatchId, ViewBatchProcessor>,
    next_batch: BatchId,
    generator_timer: Option<TimerId>,
    pending_saves: HashSet<String>,
}

impl PanelContext {
    /// Build the context, configuring the cache from `settings`
    pub fn new(config: PanelConfig, settings: Settings) -> CoreResult<Self> {
        let cache = ThumbnailCache::new(settings.cache_config()?);
        Ok(Self {
            registry: DocumentRegistry::new(config.registry.clone()),
            config,
            timers: TimerQueue::new(),
            cache,
            settings,
            panels: Vec::new(),
            batches: HashMap::new(),
            next_batch: 1,
            generator_timer: None,
            pending_saves: HashSet::new(),
        })
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ThumbnailCache {
        &mut self.cache
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn timers(&self) -> &TimerQueue<PanelTask> {
        &self.timers
    }

    /// Replace the settings and apply them to the cache and every panel
    pub fn apply_settings(&mut self, settings: Settings) -> CoreResult<()> {
        let cache_config = settings.cache_config()?;
        let params = settings.layout_params()?;
        self.cache.set_config(cache_config);
        for panel in &mut self.panels {
            panel.set_layout_params(params);
        }
        self.settings = settings;
        Ok(())
    }

    // Host notifications

    pub fn on_view_created(&mut self, view: ViewId) {
        log::debug!("{} created", view);
        self.registry.schedule_refresh(&mut self.timers, PanelTask::RegistryRefresh);
    }

    pub fn on_view_closed(&mut self, view: ViewId) {
        log::debug!("{} closed", view);
        self.registry.schedule_refresh(&mut self.timers, PanelTask::RegistryRefresh);
    }

    pub fn on_window_created(&mut self, window: WindowId) {
        log::debug!("{} created", window);
        self.registry.schedule_refresh(&mut self.timers, PanelTask::RegistryRefresh);
    }

    /// The host finished (or started) writing `file_name`
    pub fn on_document_saved(&mut self, file_name: &str) {
        if self.pending_saves.insert(file_name.to_string()) {
            self.timers
                .schedule(0, PanelTask::SaveStatusCheck { file_name: file_name.to_string() });
        }
    }

    // Panels

    /// Open a panel laid out according to the current settings
    pub fn open_panel(&mut self) -> CoreResult<ConsumerId> {
        let params = self.settings.layout_params()?;
        Ok(self.open_panel_with(params))
    }

    pub fn open_panel_with(&mut self, params: LayoutParams) -> ConsumerId {
        let panel = ThumbnailPanel::new(params);
        let id = panel.id();
        self.panels.push(panel);
        id
    }

    /// Close a panel, releasing every thumbnail it holds
    pub fn close_panel(&mut self, id: ConsumerId) -> bool {
        let Some(position) = self.panels.iter().position(|panel| panel.id() == id) else {
            return false;
        };
        let mut panel = self.panels.remove(position);
        panel.release_all(&mut self.cache);
        true
    }

    pub fn panel(&self, id: ConsumerId) -> Option<&ThumbnailPanel> {
        self.panels.iter().find(|panel| panel.id() == id)
    }

    pub fn panel_mut(&mut self, id: ConsumerId) -> Option<&mut ThumbnailPanel> {
        self.panels.iter_mut().find(|panel| panel.id() == id)
    }

    /// What panel `id` should draw right now
    pub fn paint_items(&mut self, id: ConsumerId) -> Vec<PaintItem> {
        let cache = &self.cache;
        self.panels
            .iter_mut()
            .find(|panel| panel.id() == id)
            .map(|panel| panel.paint_items(cache))
            .unwrap_or_default()
    }

    /// Re-sync every panel, e.g. after a scroll or resize
    pub fn sync_panels(&mut self, host: &dyn ViewHost) {
        for panel in &mut self.panels {
            panel.sync(&self.registry, host, &mut self.cache);
        }
        self.ensure_generator_stepping();
    }

    // Documents

    /// Mark every thumbnail of `document` stale and re-render the visible ones
    pub fn invalidate_document(&mut self, host: &dyn ViewHost, document: DocumentId) -> CoreResult<()> {
        if !self.registry.contains(document) {
            return Err(CoreError::UnknownDocument(document));
        }
        self.cache.invalidate_thumbnails(document);
        self.sync_panels(host);
        Ok(())
    }

    /// Bring the first view of `document` to the front
    pub fn activate_document(
        &mut self,
        host: &mut dyn ViewHost,
        document: DocumentId,
    ) -> CoreResult<ViewId> {
        if !self.registry.contains(document) {
            return Err(CoreError::UnknownDocument(document));
        }
        let view = host
            .views()
            .into_iter()
            .find(|info| info.document == document)
            .ok_or(CoreError::UnknownDocument(document))?;
        if !host.activate_view(view.view) {
            return Err(CoreError::StaleView(view.view));
        }
        host.raise_window(view.window);
        Ok(view.view)
    }

    /// Queue a batch job; it starts on the next scheduler turn
    pub fn start_batch(&mut self, job: BatchJob) -> BatchId {
        let id = self.next_batch;
        self.next_batch += 1;
        let processor = ViewBatchProcessor::with_default_cap(job, self.config.batch_max_iterations);
        self.batches.insert(id, processor);
        self.timers.schedule(0, PanelTask::BatchStep(id));
        id
    }

    pub fn batch_running(&self, id: BatchId) -> bool {
        self.batches.contains_key(&id)
    }

    /// Notifications queued by the cache since the last call
    pub fn drain_events(&mut self) -> Vec<CacheEvent> {
        self.cache.drain_events()
    }

    // Scheduler loop

    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    pub fn advance_to(&mut self, now_ms: u64) {
        self.timers.advance_to(now_ms);
    }

    /// Run every task that is due, returning how many ran
    ///
    /// Tasks scheduled while these run wait for the next call, even when
    /// they are already due.
    pub fn run_due(&mut self, host: &mut dyn ViewHost) -> usize {
        let mut due = Vec::new();
        while let Some(timer) = self.timers.pop_due() {
            due.push(timer);
        }
        let ran = due.len();
        for (id, task) in due {
            if let Err(err) = self.dispatch(id, task, host) {
                log::warn!("panel task failed: {}", err);
            }
        }
        ran
    }

    /// Run tasks, advancing the clock as needed, until the queue is empty or
    /// the next task lies more than `horizon_ms` ahead of the starting time
    pub fn run_until_idle(&mut self, host: &mut dyn ViewHost, horizon_ms: u64) -> usize {
        let deadline = self.timers.now_ms().saturating_add(horizon_ms);
        let mut ran = self.run_due(host);
        while let Some(due) = self.timers.next_due_ms() {
            if due > deadline {
                break;
            }
            self.timers.advance_to(due);
            ran += self.run_due(host);
        }
        ran
    }

    fn dispatch(&mut self, id: TimerId, task: PanelTask, host: &mut dyn ViewHost) -> CoreResult<()> {
        match task {
            PanelTask::RegistryRefresh => {
                if self.registry.refresh_due(id) {
                    self.refresh_registry(host);
                }
            }
            PanelTask::GeneratorStep => {
                if self.generator_timer == Some(id) {
                    self.generator_timer = None;
                }
                let running = self.cache.step_generators(&HostRenderers(&*host));
                if running > 0 {
                    self.ensure_generator_stepping();
                }
            }
            PanelTask::BatchStep(batch) => {
                let Some(processor) = self.batches.get_mut(&batch) else {
                    log::warn!("batch job {} no longer exists", batch);
                    return Ok(());
                };
                if processor.step(host).is_terminal() {
                    self.batches.remove(&batch);
                } else {
                    self.timers.schedule(0, PanelTask::BatchStep(batch));
                }
            }
            PanelTask::SaveStatusCheck { file_name } => match host.file_status(&file_name) {
                FileStatus::Busy => {
                    log::debug!("{} is still being written", file_name);
                    self.timers.schedule(
                        self.config.save_retry_delay_ms,
                        PanelTask::SaveStatusCheck { file_name },
                    );
                }
                FileStatus::Ready => {
                    self.pending_saves.remove(&file_name);
                    for document in self.registry.documents_with_file(&file_name) {
                        log::debug!("{} saved; refreshing its thumbnails", document);
                        self.cache.invalidate_thumbnails(document);
                    }
                    self.sync_panels(&*host);
                }
            },
        }
        Ok(())
    }

    fn refresh_registry(&mut self, host: &dyn ViewHost) -> RegistryChanges {
        let panels = &mut self.panels;
        let cache = &mut self.cache;
        let changes = self.registry.refresh(host, |record| {
            for panel in panels.iter_mut() {
                panel.release_document(record.id(), cache);
            }
            cache.remove_document(record.id());
        });

        for document in &changes.resized {
            self.cache.invalidate_thumbnails(*document);
        }
        if !changes.is_empty() {
            log::info!(
                "documents: {} added, {} removed, {} tracked",
                changes.added.len(),
                changes.removed.len(),
                self.registry.len()
            );
        }
        self.sync_panels(host);
        changes
    }

    fn ensure_generator_stepping(&mut self) {
        if self.generator_timer.is_none() && self.cache.generating_count() > 0 {
            let id = self
                .timers
                .schedule(self.config.generator_step_delay_ms, PanelTask::GeneratorStep);
            self.generator_timer = Some(id);
        }
    }
}

impl std::fmt::Debug for PanelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelContext")
            .field("documents", &self.registry.len())
            .field("panels", &self.panels.len())
            .field("batches", &self.batches.len())
            .field("pending_timers", &self.timers.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{FakeDocument, FakeHost};
    use docpanel_layout::{LayoutPolicy, Size};
    use docpanel_render::ThumbnailBackend;

    fn context() -> PanelContext {
        PanelContext::new(PanelConfig::default(), Settings::new()).unwrap()
    }

    fn open_panel(context: &mut PanelContext) -> ConsumerId {
        let id = context.open_panel_with(
            LayoutParams::default().with_policy(LayoutPolicy::Masonry).with_lanes(1).with_spacing(0),
        );
        context.panel_mut(id).unwrap().resize(Size::new(200, 1000));
        id
    }

    #[test]
    fn test_view_notifications_are_debounced() {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(1, 800, 600), &[(10, 1)]);
        let mut context = context();

        context.on_view_created(ViewId(10));
        context.on_window_created(WindowId(1));
        assert_eq!(context.timers().pending(), 1);

        assert_eq!(context.run_due(&mut host), 1);
        assert!(context.registry().contains(DocumentId(1)));
    }

    #[test]
    fn test_closed_document_releases_cache_before_record() {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(1, 800, 600), &[(10, 1)]);
        let mut context = context();
        let panel = open_panel(&mut context);
        context.on_view_created(ViewId(10));
        context.run_due(&mut host);
        assert!(context.panel(panel).unwrap().held_key(DocumentId(1)).is_some());
        assert_eq!(context.cache().entry_count(), 1);

        host.close_view(ViewId(10));
        context.on_view_closed(ViewId(10));
        context.run_due(&mut host);

        assert!(!context.registry().contains(DocumentId(1)));
        assert_eq!(context.panel(panel).unwrap().held_key(DocumentId(1)), None);
        assert_eq!(context.cache().entry_count(), 0);
        assert_eq!(context.cache().unused_bytes(), 0);
    }

    #[test]
    fn test_progressive_renders_are_stepped_by_the_scheduler() {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(1, 1024, 1024), &[(10, 1)]);
        let mut settings = Settings::new();
        settings.set(docpanel_cache::KEY_BACKEND, ThumbnailBackend::Progressive.as_str());
        let mut context = PanelContext::new(PanelConfig::default(), settings).unwrap();
        let panel = open_panel(&mut context);

        context.on_view_created(ViewId(10));
        context.run_due(&mut host);
        let key = context.panel(panel).unwrap().held_key(DocumentId(1)).unwrap();
        assert!(context.cache().entry(DocumentId(1), key).unwrap().is_generating());

        context.run_until_idle(&mut host, 1000);

        let entry = context.cache().entry(DocumentId(1), key).unwrap();
        assert!(!entry.is_generating());
        assert!(entry.image().is_some());
        assert_eq!(host.documents[&DocumentId(1)].renders.get(), 4);
        assert!(context
            .drain_events()
            .contains(&CacheEvent::ThumbnailReady { document: DocumentId(1), key }));
        assert!(context.timers().is_idle());
    }

    #[test]
    fn test_save_check_retries_while_busy() {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(1, 800, 600), &[(10, 1)]);
        host.busy_checks.set(2);
        let mut context = context();
        let panel = open_panel(&mut context);
        context.on_view_created(ViewId(10));
        context.run_due(&mut host);
        assert_eq!(host.documents[&DocumentId(1)].renders.get(), 1);

        context.on_document_saved("/tmp/doc1.kra");
        context.on_document_saved("/tmp/doc1.kra");
        context.run_due(&mut host);
        assert_eq!(host.busy_checks.get(), 1);

        context.run_until_idle(&mut host, 1000);

        assert_eq!(host.busy_checks.get(), 0);
        assert_eq!(context.now_ms(), 200);
        assert_eq!(host.documents[&DocumentId(1)].renders.get(), 2);
        let key = context.panel(panel).unwrap().held_key(DocumentId(1)).unwrap();
        assert!(context.cache().entry(DocumentId(1), key).unwrap().is_valid());
    }

    #[test]
    fn test_batch_job_runs_one_view_per_turn() {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(1, 800, 600), &[(10, 1), (11, 1), (12, 2)]);
        let mut context = context();

        let batch = context.start_batch(BatchJob::for_document(DocumentId(1), "close"));
        context.run_due(&mut host);
        assert!(context.batch_running(batch));

        context.run_until_idle(&mut host, 0);

        assert!(!context.batch_running(batch));
        assert!(host.views.is_empty());
    }

    #[test]
    fn test_activate_document_errors() {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(1, 800, 600), &[(10, 3)]);
        let mut context = context();

        assert!(matches!(
            context.activate_document(&mut host, DocumentId(1)),
            Err(CoreError::UnknownDocument(_))
        ));

        context.on_view_created(ViewId(10));
        context.run_due(&mut host);
        assert_eq!(context.activate_document(&mut host, DocumentId(1)).unwrap(), ViewId(10));
        assert_eq!(host.raised, vec![WindowId(3)]);
    }

    #[test]
    fn test_apply_settings_updates_cache_and_panels() {
        let mut context = context();
        let panel = open_panel(&mut context);
        let mut settings = Settings::new();
        settings.set(crate::settings::KEY_LAYOUT_POLICY, "grid");
        settings.set(docpanel_cache::KEY_CACHE_MB, "1");

        context.apply_settings(settings).unwrap();

        assert_eq!(context.cache().config().max_unused_mb(), 1);
        assert_eq!(
            context.panel(panel).unwrap().layout_params().policy,
            LayoutPolicy::Grid { stretch: false }
        );

        let mut broken = Settings::new();
        broken.set(crate::settings::KEY_LAYOUT_LANES, "many");
        assert!(context.apply_settings(broken).is_err());
        assert_eq!(context.settings().get(docpanel_cache::KEY_CACHE_MB), Some("1"));
    }

    #[test]
    fn test_close_panel_releases_thumbnails() {
        let mut host = FakeHost::default();
        host.open(FakeDocument::new(1, 800, 600), &[(10, 1)]);
        let mut context = context();
        let panel = open_panel(&mut context);
        context.on_view_created(ViewId(10));
        context.run_due(&mut host);
        assert_eq!(context.cache().unused_bytes(), 0);

        assert!(context.close_panel(panel));
        assert!(!context.close_panel(panel));
        assert_eq!(context.cache().unused_bytes(), 200 * 150 * 4);
    }
}
