pub mod analysis;
pub mod console;
pub mod error;
pub mod events;
pub mod image;
pub mod language;
pub mod models;
pub mod state;

pub use analysis::{analysis_response_schema, AnalysisDraft, AnalysisResult, VisualDetails};
pub use error::{ErrorKind, ReaderError};
pub use events::{EventLog, EventPayload, LoggedEvent, SessionEvent};
pub use image::ImageHandle;
pub use language::Language;
pub use state::{FailureStage, Reading, SessionFailure, SessionPhase, SessionState};
