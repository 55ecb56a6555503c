use std::any::Any;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;

use reader_contracts::error::ANALYSIS_FAILED_MESSAGE;
use reader_contracts::{
    AnalysisResult, ErrorKind, EventLog, EventPayload, FailureStage, Language, ReaderError,
    Reading, SessionEvent, SessionFailure, SessionPhase, SessionState,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::analysis::AnalysisClient;
use crate::synthesis::ImageSynthesisClient;

pub const IMAGE_RENDER_FAILED_MESSAGE: &str =
    "Error rendering the artistic vision. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadingInput {
    Text(String),
    Image(ImageInput),
}

impl ReadingInput {
    fn kind(&self) -> &'static str {
        match self {
            ReadingInput::Text(_) => "text",
            ReadingInput::Image(_) => "image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The session moved to `Analyzing` and a worker is running.
    Started,
    /// Blank input; nothing changed.
    IgnoredEmpty,
    /// A submission is in flight or its result has not been reset yet.
    Busy,
    /// The session left `Idle` but no worker could be started; `state()`
    /// already holds the `Error`.
    Failed,
}

struct SessionShared {
    state: Mutex<SessionState>,
    // Bumped by every reset; a worker only applies transitions for the epoch
    // it was started in.
    epoch: AtomicU64,
    observers: Mutex<Vec<mpsc::Sender<SessionState>>>,
    events: Option<EventLog>,
}

impl SessionShared {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, epoch: u64, next: SessionState) -> bool {
        let mut state = self.lock_state();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(to = next.phase().as_str(), "dropping transition from a reset submission");
            return false;
        }
        self.apply(&mut state, next);
        true
    }

    /// Caller holds the state lock, which keeps observer delivery in order.
    fn apply(&self, state: &mut SessionState, next: SessionState) {
        let from = state.phase();
        let to = next.phase();
        *state = next;
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|observer| observer.send(state.clone()).is_ok());
        }
        debug!(from = from.as_str(), to = to.as_str(), "session state changed");
        self.event(
            SessionEvent::StateChanged,
            json!({ "from": from.as_str(), "to": to.as_str() }),
        );
    }

    fn fail(&self, epoch: u64, failure: SessionFailure) {
        let payload = json!({
            "stage": failure.stage.as_str(),
            "kind": failure.kind.as_str(),
            "message": failure.message,
        });
        if self.transition(epoch, SessionState::Error(failure)) {
            self.event(SessionEvent::SessionFailed, payload);
        }
    }

    fn event(&self, event: SessionEvent, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload: EventPayload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = events.emit(event, payload) {
            warn!(event = event.as_str(), error = %err, "failed to write session event");
        }
    }
}

/// Drives one reader session: text (or a page image) in, analysis plus
/// illustration out.
///
/// `submit` returns as soon as the session is `Analyzing`; the two model calls
/// run one after the other on a worker thread. Observe progress with
/// [`ReadingSession::subscribe`] or block on [`ReadingSession::wait`].
pub struct ReadingSession {
    id: String,
    shared: Arc<SessionShared>,
    analysis: Arc<dyn AnalysisClient>,
    images: Arc<dyn ImageSynthesisClient>,
    worker: Option<WorkerHandle>,
}

struct WorkerHandle {
    thread: thread::JoinHandle<()>,
    epoch: u64,
}

impl ReadingSession {
    pub fn new(analysis: Arc<dyn AnalysisClient>, images: Arc<dyn ImageSynthesisClient>) -> Self {
        Self::build(analysis, images, None)
    }

    pub fn with_event_log(
        analysis: Arc<dyn AnalysisClient>,
        images: Arc<dyn ImageSynthesisClient>,
        events_path: impl Into<PathBuf>,
    ) -> Self {
        Self::build(analysis, images, Some(events_path.into()))
    }

    fn build(
        analysis: Arc<dyn AnalysisClient>,
        images: Arc<dyn ImageSynthesisClient>,
        events_path: Option<PathBuf>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let events = events_path.map(|path| EventLog::new(path, id.clone()));
        let session = Self {
            id,
            shared: Arc::new(SessionShared {
                state: Mutex::new(SessionState::Idle),
                epoch: AtomicU64::new(0),
                observers: Mutex::new(Vec::new()),
                events,
            }),
            analysis,
            images,
            worker: None,
        };
        session.shared.event(
            SessionEvent::SessionStarted,
            json!({
                "analysis_client": session.analysis.name(),
                "image_client": session.images.name(),
            }),
        );
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock_state().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock_state().phase()
    }

    /// Reaps a finished worker first, so a panicked run reads as `Error`.
    pub fn is_busy(&mut self) -> bool {
        self.cleanup_finished_worker();
        self.phase().is_in_flight() || self.worker_alive()
    }

    /// Receives the current state immediately, then every later transition.
    pub fn subscribe(&self) -> mpsc::Receiver<SessionState> {
        let (tx, rx) = mpsc::channel();
        let state = self.shared.lock_state();
        if tx.send(state.clone()).is_ok() {
            if let Ok(mut observers) = self.shared.observers.lock() {
                observers.push(tx);
            }
        }
        rx
    }

    pub fn submit(&mut self, raw_text: &str, language: Language) -> SubmitOutcome {
        let text = raw_text.trim();
        if text.is_empty() {
            return SubmitOutcome::IgnoredEmpty;
        }
        self.start(ReadingInput::Text(text.to_string()), language)
    }

    pub fn submit_image(&mut self, image: ImageInput, language: Language) -> SubmitOutcome {
        if image.bytes.is_empty() {
            return SubmitOutcome::IgnoredEmpty;
        }
        self.start(ReadingInput::Image(image), language)
    }

    /// Back to `Idle`, dropping any result or error. A submission still in
    /// flight is not cancelled, but nothing it produces is applied.
    pub fn reset(&mut self) {
        self.cleanup_finished_worker();
        let mut state = self.shared.lock_state();
        let from = state.phase();
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.apply(&mut state, SessionState::Idle);
        drop(state);
        self.shared
            .event(SessionEvent::SessionReset, json!({ "from": from.as_str() }));
    }

    /// Blocks until the current worker (if any) has finished.
    pub fn wait(&mut self) -> SessionState {
        if let Some(worker) = self.worker.take() {
            self.reap(worker);
        }
        self.state()
    }

    fn start(&mut self, input: ReadingInput, language: Language) -> SubmitOutcome {
        self.cleanup_finished_worker();
        if self.worker_alive() {
            return SubmitOutcome::Busy;
        }

        let epoch = {
            let mut state = self.shared.lock_state();
            if state.phase() != SessionPhase::Idle {
                return SubmitOutcome::Busy;
            }
            let epoch = self.shared.epoch.load(Ordering::SeqCst);
            self.shared.apply(&mut state, SessionState::Analyzing);
            epoch
        };
        self.shared.event(
            SessionEvent::SubmissionStarted,
            json!({ "input": input.kind(), "language": language.label() }),
        );
        info!(session = %self.id, input = input.kind(), language = language.label(), "submission started");

        let worker = SessionWorker {
            shared: Arc::clone(&self.shared),
            analysis: Arc::clone(&self.analysis),
            images: Arc::clone(&self.images),
            input,
            language,
            epoch,
        };
        match thread::Builder::new()
            .name("reader-session".to_string())
            .spawn(move || worker.run())
        {
            Ok(thread) => {
                self.worker = Some(WorkerHandle { thread, epoch });
                SubmitOutcome::Started
            }
            Err(err) => self.spawn_failed(epoch, &err),
        }
    }

    fn spawn_failed(&self, epoch: u64, err: &io::Error) -> SubmitOutcome {
        warn!(error = %err, "session worker spawn failed");
        self.shared.fail(
            epoch,
            SessionFailure {
                stage: FailureStage::Analysis,
                kind: ErrorKind::Transport,
                message: format!("Session worker spawn failed: {err}"),
            },
        );
        SubmitOutcome::Failed
    }

    fn worker_alive(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.thread.is_finished())
            .unwrap_or(false)
    }

    fn cleanup_finished_worker(&mut self) {
        let finished = self
            .worker
            .as_ref()
            .map(|worker| worker.thread.is_finished())
            .unwrap_or(false);
        if finished {
            if let Some(worker) = self.worker.take() {
                self.reap(worker);
            }
        }
    }

    /// Joins the worker; a panicked worker leaves its run in `Error`.
    fn reap(&self, worker: WorkerHandle) {
        let Err(panic) = worker.thread.join() else {
            return;
        };
        let phase = self.phase();
        warn!(
            phase = phase.as_str(),
            panic = panic_message(panic.as_ref()),
            "session worker panicked"
        );
        let failure = match phase {
            SessionPhase::Analyzing => SessionFailure {
                stage: FailureStage::Analysis,
                kind: ErrorKind::Transport,
                message: ANALYSIS_FAILED_MESSAGE.to_string(),
            },
            SessionPhase::Painting => SessionFailure {
                stage: FailureStage::Painting,
                kind: ErrorKind::ImageSynthesis,
                message: IMAGE_RENDER_FAILED_MESSAGE.to_string(),
            },
            SessionPhase::Idle | SessionPhase::Result | SessionPhase::Error => return,
        };
        self.shared.fail(worker.epoch, failure);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

enum Halt {
    Failed(SessionFailure),
    Superseded,
}

struct SessionWorker {
    shared: Arc<SessionShared>,
    analysis: Arc<dyn AnalysisClient>,
    images: Arc<dyn ImageSynthesisClient>,
    input: ReadingInput,
    language: Language,
    epoch: u64,
}

impl SessionWorker {
    fn run(self) {
        match self.execute() {
            Ok(reading) => {
                let bytes = reading.image.byte_len();
                if self.shared.transition(self.epoch, SessionState::Result(reading)) {
                    self.shared
                        .event(SessionEvent::ImageRendered, json!({ "bytes": bytes }));
                }
            }
            Err(Halt::Failed(failure)) => self.shared.fail(self.epoch, failure),
            Err(Halt::Superseded) => {}
        }
    }

    fn execute(&self) -> Result<Reading, Halt> {
        let analysis = self.analyze().map_err(|err| {
            warn!(kind = err.kind().as_str(), error = %err, "analysis stage failed");
            Halt::Failed(analysis_failure(&err))
        })?;
        if !self.shared.transition(self.epoch, SessionState::Painting) {
            return Err(Halt::Superseded);
        }
        self.shared.event(
            SessionEvent::AnalysisCompleted,
            json!({ "source_language": analysis.source_language }),
        );

        // On failure the analysis is dropped with this frame; a failed
        // painting never exposes a partial result.
        let image = self.images.generate(&analysis.image_prompt).map_err(|err| {
            warn!(kind = err.kind().as_str(), error = %err, "painting stage failed");
            Halt::Failed(SessionFailure {
                stage: FailureStage::Painting,
                kind: err.kind(),
                message: IMAGE_RENDER_FAILED_MESSAGE.to_string(),
            })
        })?;
        Ok(Reading { analysis, image })
    }

    fn analyze(&self) -> Result<AnalysisResult, ReaderError> {
        match &self.input {
            ReadingInput::Text(text) => self.analysis.analyze_from_text(text, self.language),
            ReadingInput::Image(image) => {
                self.analysis
                    .analyze_from_image(&image.bytes, &image.mime_type, self.language)
            }
        }
    }
}

fn analysis_failure(err: &ReaderError) -> SessionFailure {
    let message = err.to_string();
    SessionFailure {
        stage: FailureStage::Analysis,
        kind: err.kind(),
        message: if message.trim().is_empty() {
            ANALYSIS_FAILED_MESSAGE.to_string()
        } else {
            message
        },
    }
}
