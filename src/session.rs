//! Concurrent exploration sessions.
//!
//! Sessions isolate concurrent exploration requests: each holds its
//! own accumulated design models, decision models, and solutions, and
//! no cross-session sharing exists. Long-running searches run on a
//! bounded set of worker threads; cancellation is cooperative, the
//! producer notices a closed stream or an explicit cancel at the next
//! solution boundary and stops scheduling further work. All state is
//! in-memory for the lifetime of the session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::explore::{CancellationToken, ExplorationConfiguration, ExplorationPhase, Explorer};
use crate::types::{
    contains_decision_model, contains_design_model, DecisionModel, DesignModel,
    ExplorationBidding, ExplorationSolution,
};

/// Shared state of one exploration session.
pub struct ExplorationSession {
    key: String,
    design_models: Mutex<Vec<Arc<dyn DesignModel>>>,
    decision_models: Mutex<Vec<Arc<dyn DecisionModel>>>,
    solutions: Mutex<Vec<ExplorationSolution>>,
    phase: Mutex<ExplorationPhase>,
    cancellation: CancellationToken,
}

impl ExplorationSession {
    fn new(key: String) -> Self {
        Self {
            key,
            design_models: Mutex::new(Vec::new()),
            decision_models: Mutex::new(Vec::new()),
            solutions: Mutex::new(Vec::new()),
            phase: Mutex::new(ExplorationPhase::Idle),
            cancellation: CancellationToken::new(),
        }
    }

    /// The session key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append a design model, deduplicating by equality.
    pub fn add_design_model(&self, model: Arc<dyn DesignModel>) {
        let mut models = self.design_models.lock();
        if !contains_design_model(&models, &model) {
            models.push(model);
        }
    }

    /// Append a decision model, deduplicating by equality.
    pub fn add_decision_model(&self, model: Arc<dyn DecisionModel>) {
        let mut models = self.decision_models.lock();
        if !contains_decision_model(&models, &model) {
            models.push(model);
        }
    }

    /// Append a solution.
    pub fn add_solution(&self, solution: ExplorationSolution) {
        self.solutions.lock().push(solution);
    }

    /// Snapshot of the accumulated design models.
    pub fn design_models(&self) -> Vec<Arc<dyn DesignModel>> {
        self.design_models.lock().clone()
    }

    /// Snapshot of the accumulated decision models.
    pub fn decision_models(&self) -> Vec<Arc<dyn DecisionModel>> {
        self.decision_models.lock().clone()
    }

    /// Snapshot of the accumulated solutions.
    pub fn solutions(&self) -> Vec<ExplorationSolution> {
        self.solutions.lock().clone()
    }

    /// Current phase of the session's exploration request.
    pub fn phase(&self) -> ExplorationPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: ExplorationPhase) {
        *self.phase.lock() = phase;
    }

    /// Collect biddings from candidate explorers for a decision model.
    ///
    /// Moves the session into the bidding phase; `bid` itself has no
    /// side effects on the explorers.
    pub fn collect_biddings(
        &self,
        explorers: &[Arc<dyn Explorer>],
        model: &Arc<dyn DecisionModel>,
    ) -> Vec<ExplorationBidding> {
        self.set_phase(ExplorationPhase::Bidding);
        explorers.iter().map(|e| e.bid(model)).collect()
    }

    /// Request cooperative cancellation of the running search.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The token observed by this session's search worker.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}

/// Registry of live sessions, keyed by session identifier.
///
/// The map is safe for simultaneous reads and appends from a session's
/// own worker and from external model-submission requests.
pub struct ExplorationSessionRegistry {
    sessions: RwLock<HashMap<String, Arc<ExplorationSession>>>,
    worker_limit: usize,
    active_workers: Arc<AtomicUsize>,
}

impl ExplorationSessionRegistry {
    /// A registry allowing up to `worker_limit` concurrent searches.
    pub fn new(worker_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            worker_limit: worker_limit.max(1),
            active_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a session and return its handle.
    pub fn create_session(&self) -> Arc<ExplorationSession> {
        let key = Uuid::new_v4().to_string();
        let session = Arc::new(ExplorationSession::new(key.clone()));
        self.sessions.write().insert(key, session.clone());
        debug!(session = %session.key(), "session created");
        session
    }

    /// Look up a session by key.
    pub fn session(&self, key: &str) -> Option<Arc<ExplorationSession>> {
        self.sessions.read().get(key).cloned()
    }

    /// Drop a session and request cancellation of its search.
    pub fn remove_session(&self, key: &str) {
        if let Some(session) = self.sessions.write().remove(key) {
            session.cancel();
        }
    }

    /// Number of currently running search workers.
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Start an exploration on a worker thread, streaming solutions.
    ///
    /// Returns `None` when the worker pool is saturated. The stream
    /// closes when the search exhausts its budgets; dropping the
    /// stream cancels the search cooperatively.
    pub fn spawn_exploration(
        &self,
        session: Arc<ExplorationSession>,
        explorer: Arc<dyn Explorer>,
        model: Arc<dyn DecisionModel>,
        configuration: ExplorationConfiguration,
    ) -> Option<SolutionStream> {
        let active = self.active_workers.clone();
        if active.fetch_add(1, Ordering::SeqCst) >= self.worker_limit {
            active.fetch_sub(1, Ordering::SeqCst);
            warn!(session = %session.key(), "worker pool saturated");
            return None;
        }

        session.set_phase(ExplorationPhase::Searching);
        let (sender, receiver) = mpsc::channel();
        let worker_session = session.clone();
        let handle = std::thread::spawn(move || {
            let previous = worker_session.solutions();
            let token = worker_session.cancellation_token();
            for solution in explorer.explore(model, &previous, configuration, token) {
                if worker_session.is_cancelled() {
                    break;
                }
                worker_session.set_phase(ExplorationPhase::Streaming);
                worker_session.add_solution(solution.clone());
                if sender.send(solution).is_err() {
                    // Consumer went away; stop scheduling evaluations.
                    worker_session.cancel();
                    break;
                }
            }
            let final_phase = if worker_session.is_cancelled() {
                ExplorationPhase::Cancelled
            } else {
                ExplorationPhase::Done
            };
            worker_session.set_phase(final_phase);
            active.fetch_sub(1, Ordering::SeqCst);
            debug!(session = %worker_session.key(), ?final_phase, "search worker finished");
        });

        Some(SolutionStream {
            session,
            receiver,
            handle: Some(handle),
        })
    }
}

impl Default for ExplorationSessionRegistry {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Consumer end of a streamed exploration.
///
/// Iterating blocks on the next solution; the stream ends when the
/// search finishes. Dropping the stream cancels the search.
pub struct SolutionStream {
    session: Arc<ExplorationSession>,
    receiver: mpsc::Receiver<ExplorationSolution>,
    handle: Option<JoinHandle<()>>,
}

impl SolutionStream {
    /// The session this stream belongs to.
    pub fn session(&self) -> &Arc<ExplorationSession> {
        &self.session
    }

    /// Wait for the worker to wind down.
    pub fn join(mut self) {
        self.session.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Iterator for SolutionStream {
    type Item = ExplorationSolution;

    fn next(&mut self) -> Option<ExplorationSolution> {
        self.receiver.recv().ok()
    }
}

impl Drop for SolutionStream {
    fn drop(&mut self) {
        self.session.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
