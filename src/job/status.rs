/// Job status definitions
///
/// A job moves `New -> Pending -> Completed`; `Pending -> Pending` is allowed
/// so the execution loop can re-save a job after every window.
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, not yet scheduled
    New,

    /// At least one window has run and work remains
    Pending,

    /// Terminal: the frontier is exhausted
    Completed,
}

impl Status {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the job still has work to do
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::Pending)
    }

    /// Whether a job in this state may move to `next`
    pub fn can_transition_to(&self, next: Status) -> bool {
        match (self, next) {
            (Self::New, Self::Pending) | (Self::Pending, Self::Pending) => true,
            (_, Self::Completed) => true,
            _ => false,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn all_states() -> [Self; 3] {
        [Self::New, Self::Pending, Self::Completed]
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}
