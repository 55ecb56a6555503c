use serde::Serialize;

use crate::analysis::AnalysisResult;
use crate::error::ErrorKind;
use crate::image::ImageHandle;

/// Both outputs of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub analysis: AnalysisResult,
    pub image: ImageHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Analysis,
    Painting,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::Analysis => "analysis",
            FailureStage::Painting => "painting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub stage: FailureStage,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Analyzing,
    Painting,
    Result(Reading),
    Error(SessionFailure),
}

/// Data-less tag of a [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Analyzing,
    Painting,
    Result,
    Error,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Analyzing => "analyzing",
            SessionPhase::Painting => "painting",
            SessionPhase::Result => "result",
            SessionPhase::Error => "error",
        }
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, SessionPhase::Analyzing | SessionPhase::Painting)
    }
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Analyzing => SessionPhase::Analyzing,
            SessionState::Painting => SessionPhase::Painting,
            SessionState::Result(_) => SessionPhase::Result,
            SessionState::Error(_) => SessionPhase::Error,
        }
    }

    pub fn reading(&self) -> Option<&Reading> {
        match self {
            SessionState::Result(reading) => Some(reading),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        match self {
            SessionState::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FailureStage, SessionFailure, SessionPhase, SessionState};
    use crate::error::ErrorKind;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(SessionState::default(), SessionState::Idle);
        assert_eq!(SessionState::default().phase(), SessionPhase::Idle);
    }

    #[test]
    fn only_analyzing_and_painting_are_in_flight() {
        assert!(SessionPhase::Analyzing.is_in_flight());
        assert!(SessionPhase::Painting.is_in_flight());
        assert!(!SessionPhase::Idle.is_in_flight());
        assert!(!SessionPhase::Result.is_in_flight());
        assert!(!SessionPhase::Error.is_in_flight());
    }

    #[test]
    fn error_state_exposes_failure_but_no_reading() {
        let state = SessionState::Error(SessionFailure {
            stage: FailureStage::Painting,
            kind: ErrorKind::ImageSynthesis,
            message: "boom".to_string(),
        });
        assert_eq!(state.phase().as_str(), "error");
        assert!(state.reading().is_none());
        assert_eq!(state.failure().map(|f| f.stage), Some(FailureStage::Painting));
    }
}
