use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Downloading,
    Merging,
    FixingContainer,
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Merging => "merging",
            Self::FixingContainer => "fixing_container",
            Self::Done => "done",
        }
    }

    /// True for phases that mean a file is being produced right now.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Downloading | Self::Merging | Self::FixingContainer
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLifecycle {
    NotStarted,
    Running { run_id: u64 },
    Exited { run_id: u64, exit_code: Option<i32> },
}

impl RunLifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running { .. } => "running",
            Self::Exited { .. } => "exited",
        }
    }

    pub fn running_id(self) -> Option<u64> {
        match self {
            Self::Running { run_id } => Some(run_id),
            Self::NotStarted | Self::Exited { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowMode {
    Following,
    Detached,
}

/// Who moved the viewport. Programmatic scrolls are the viewport's own
/// scroll-to-end writes echoed back by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOrigin {
    User,
    Programmatic,
}
