use serde::{Deserialize, Serialize};

/// Lifecycle of one canvas detector.
///
/// `Idle -> Buffering` on every stroke, `Buffering -> Detecting` when the
/// debounce fires, then `Quiescent` (nothing more to do) or `Escalating`
/// while the recognizer works, which settles back to `Quiescent`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DetectorState {
    #[default]
    Idle,
    Buffering,
    Detecting,
    Quiescent,
    Escalating,
}

impl DetectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorState::Idle => "idle",
            DetectorState::Buffering => "buffering",
            DetectorState::Detecting => "detecting",
            DetectorState::Quiescent => "quiescent",
            DetectorState::Escalating => "escalating",
        }
    }

    /// A detection run is in progress.
    pub fn is_busy(&self) -> bool {
        matches!(self, DetectorState::Detecting | DetectorState::Escalating)
    }
}
