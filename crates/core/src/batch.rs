//! Applying one operation to a changing set of views, one view per step
//!
//! Operations like "close every view of this document" change the very set
//! they iterate over: closing one view may close others or move focus. The
//! processor therefore re-selects its candidates from the host at the start
//! of every step instead of working from a snapshot, and returns control to
//! the scheduler between views.
//!
//! ```text
//! Init -> [Confirm] -> [PreProcess] -> Running (one view per step) -> Finished
//!            |              |              |
//!            +--------------+--------------+----> Cancelled
//! ```

use crate::host::{ViewHost, ViewInfo};
use docpanel_cache::DocumentId;

/// Default bound on operation runs per job
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

/// Selection predicate over the host's current views
pub type Selector = Box<dyn FnMut(&ViewInfo, &dyn ViewHost) -> bool>;
/// Called with the initial candidate count when it is above one; `false` cancels
pub type ConfirmHook = Box<dyn FnMut(usize) -> bool>;
/// Runs once before any operation; `false` cancels
pub type PreProcessHook = Box<dyn FnMut(&mut dyn ViewHost) -> bool>;
/// Runs when exactly one candidate is left; `false` cancels
pub type LastViewHook = Box<dyn FnMut(&mut dyn ViewHost, &ViewInfo) -> bool>;
/// Receives the outcome exactly once
pub type FinishedHook = Box<dyn FnOnce(BatchOutcome)>;

/// What to do with each selected view
pub enum BatchOperation {
    /// Fire a named host command at the (activated) view
    Action(String),
    /// Arbitrary code
    Custom(Box<dyn FnMut(&mut dyn ViewHost, &ViewInfo)>),
}

impl BatchOperation {
    pub fn action(name: impl Into<String>) -> Self {
        BatchOperation::Action(name.into())
    }

    pub fn custom(operation: impl FnMut(&mut dyn ViewHost, &ViewInfo) + 'static) -> Self {
        BatchOperation::Custom(Box::new(operation))
    }

    fn apply(&mut self, host: &mut dyn ViewHost, view: &ViewInfo) {
        match self {
            BatchOperation::Action(name) => host.invoke_action(name),
            BatchOperation::Custom(operation) => operation(host, view),
        }
    }
}

impl std::fmt::Debug for BatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchOperation::Action(name) => f.debug_tuple("Action").field(name).finish(),
            BatchOperation::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// How a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No candidates were left
    Completed { processed: u32 },
    /// A confirmation or hook declined before or during the run
    Cancelled { processed: u32 },
    /// Candidates remained after the iteration cap
    IterationCapReached { processed: u32 },
}

impl BatchOutcome {
    pub fn processed(&self) -> u32 {
        match self {
            BatchOutcome::Completed { processed }
            | BatchOutcome::Cancelled { processed }
            | BatchOutcome::IterationCapReached { processed } => *processed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Init,
    Confirm,
    PreProcess,
    Running,
    Finished,
    Cancelled,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Finished | BatchState::Cancelled)
    }
}

/// Description of a batch job
pub struct BatchJob {
    operation: BatchOperation,
    select: Selector,
    confirm: Option<ConfirmHook>,
    pre_process: Option<PreProcessHook>,
    last_view: Option<LastViewHook>,
    finished: Option<FinishedHook>,
    switch_to_view: bool,
    max_iterations: Option<u32>,
}

impl BatchJob {
    pub fn new(
        operation: BatchOperation,
        select: impl FnMut(&ViewInfo, &dyn ViewHost) -> bool + 'static,
    ) -> Self {
        Self {
            operation,
            select: Box::new(select),
            confirm: None,
            pre_process: None,
            last_view: None,
            finished: None,
            switch_to_view: true,
            max_iterations: None,
        }
    }

    /// Run the named host `action` on every view of `document`
    pub fn for_document(document: DocumentId, action: impl Into<String>) -> Self {
        Self::new(BatchOperation::action(action), move |info, _| info.document == document)
    }

    /// Ask before touching more than one view
    pub fn with_confirm(mut self, hook: impl FnMut(usize) -> bool + 'static) -> Self {
        self.confirm = Some(Box::new(hook));
        self
    }

    pub fn with_pre_process(
        mut self,
        hook: impl FnMut(&mut dyn ViewHost) -> bool + 'static,
    ) -> Self {
        self.pre_process = Some(Box::new(hook));
        self
    }

    pub fn with_last_view(
        mut self,
        hook: impl FnMut(&mut dyn ViewHost, &ViewInfo) -> bool + 'static,
    ) -> Self {
        self.last_view = Some(Box::new(hook));
        self
    }

    pub fn with_finished(mut self, hook: impl FnOnce(BatchOutcome) + 'static) -> Self {
        self.finished = Some(Box::new(hook));
        self
    }

    /// Activate each view and raise its window before operating on it
    pub fn with_switch_to_view(mut self, switch: bool) -> Self {
        self.switch_to_view = switch;
        self
    }

    /// Override the iteration cap the processor would otherwise apply
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

/// Step-driven executor of one [`BatchJob`]
pub struct ViewBatchProcessor {
    job: BatchJob,
    max_iterations: u32,
    state: BatchState,
    iterations: u32,
    processed: u32,
    last_view_done: bool,
    outcome: Option<BatchOutcome>,
}

impl ViewBatchProcessor {
    pub fn new(job: BatchJob) -> Self {
        Self::with_default_cap(job, DEFAULT_MAX_ITERATIONS)
    }

    /// Use `cap` unless the job sets its own iteration cap
    pub fn with_default_cap(job: BatchJob, cap: u32) -> Self {
        Self {
            max_iterations: job.max_iterations.unwrap_or(cap),
            job,
            state: BatchState::Init,
            iterations: 0,
            processed: 0,
            last_view_done: false,
            outcome: None,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn outcome(&self) -> Option<BatchOutcome> {
        self.outcome
    }

    /// Number of times the operation has run
    pub fn processed(&self) -> u32 {
        self.processed
    }

    pub fn is_done(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance by one state transition or one view
    pub fn step(&mut self, host: &mut dyn ViewHost) -> BatchState {
        match self.state {
            BatchState::Init => {
                let count = self.candidates(host).len();
                self.state = if self.job.confirm.is_some() && count > 1 {
                    BatchState::Confirm
                } else {
                    BatchState::PreProcess
                };
            }
            BatchState::Confirm => {
                let count = self.candidates(host).len();
                let confirmed = match self.job.confirm.as_mut() {
                    Some(confirm) if count > 1 => confirm(count),
                    _ => true,
                };
                if confirmed {
                    self.state = BatchState::PreProcess;
                } else {
                    log::debug!("batch job declined for {} views", count);
                    self.cancel();
                }
            }
            BatchState::PreProcess => {
                let proceed = match self.job.pre_process.as_mut() {
                    Some(hook) => hook(host),
                    None => true,
                };
                if proceed {
                    self.state = BatchState::Running;
                } else {
                    self.cancel();
                }
            }
            BatchState::Running => self.run_once(host),
            BatchState::Finished | BatchState::Cancelled => {}
        }
        self.state
    }

    /// Step until the job ends, returning its outcome
    ///
    /// For hosts and tests that do not need to interleave other work.
    pub fn run_to_end(&mut self, host: &mut dyn ViewHost) -> BatchOutcome {
        while !self.step(host).is_terminal() {}
        self.outcome.unwrap_or(BatchOutcome::Cancelled { processed: self.processed })
    }

    fn run_once(&mut self, host: &mut dyn ViewHost) {
        let candidates = self.candidates(host);
        let Some(target) = candidates.first().copied() else {
            self.finish(BatchState::Finished, BatchOutcome::Completed { processed: self.processed });
            return;
        };
        if self.iterations >= self.max_iterations {
            log::warn!(
                "batch job stopped after {} iterations with {} candidates left",
                self.iterations,
                candidates.len()
            );
            self.finish(
                BatchState::Finished,
                BatchOutcome::IterationCapReached { processed: self.processed },
            );
            return;
        }
        self.iterations += 1;

        if candidates.len() == 1 && !self.last_view_done {
            self.last_view_done = true;
            if let Some(hook) = self.job.last_view.as_mut() {
                if !hook(host, &target) {
                    self.cancel();
                    return;
                }
            }
        }

        if self.job.switch_to_view {
            if !host.activate_view(target.view) {
                log::warn!("{} vanished before it could be activated", target.view);
                return;
            }
            host.raise_window(target.window);
        }

        self.job.operation.apply(host, &target);
        self.processed += 1;
    }

    fn candidates(&mut self, host: &mut dyn ViewHost) -> Vec<ViewInfo> {
        let host: &dyn ViewHost = host;
        let select = &mut self.job.select;
        host.views().into_iter().filter(|info| select(info, host)).collect()
    }

    fn cancel(&mut self) {
        self.finish(BatchState::Cancelled, BatchOutcome::Cancelled { processed: self.processed });
    }

    fn finish(&mut self, state: BatchState, outcome: BatchOutcome) {
        self.state = state;
        self.outcome = Some(outcome);
        if let Some(finished) = self.job.finished.take() {
            finished(outcome);
        }
        log::debug!("batch job ended: {:?}", outcome);
    }
}

impl std::fmt::Debug for ViewBatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewBatchProcessor")
            .field("operation", &self.job.operation)
            .field("state", &self.state)
            .field("iterations", &self.iterations)
            .field("processed", &self.processed)
            .finish()
    }
}
