//! Bring-up state tracking.

use std::fmt;

use crate::protocol::ChecksumMode;

/// Where device bring-up stands.
///
/// `Probing..=Stage1Exec` talk to the boot ROM in CRC mode; everything from
/// `Stage2Probing` on talks to FDL1/FDL2 with the internet checksum.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BootState {
    /// Waiting for the boot ROM to answer.
    #[default]
    Probing,
    /// Boot ROM acknowledged `CONNECT`.
    Connected,
    /// FDL1 is in device RAM.
    Stage1Loaded,
    /// FDL1 was started.
    Stage1Exec,
    /// Waiting for FDL1 to answer.
    Stage2Probing,
    /// FDL1 acknowledged `CONNECT`.
    Stage2Connected,
    /// FDL2 is in device RAM.
    Stage2Loaded,
    /// FDL2 was started.
    Stage2Exec,
    /// FDL2 is serving partitions.
    Ready,
    /// Bring-up failed; the device is left wherever it stopped.
    Aborted(String),
}

impl fmt::Display for BootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootState::Probing => write!(f, "PROBING"),
            BootState::Connected => write!(f, "CONNECTED"),
            BootState::Stage1Loaded => write!(f, "STAGE1_LOADED"),
            BootState::Stage1Exec => write!(f, "STAGE1_EXEC"),
            BootState::Stage2Probing => write!(f, "STAGE2_PROBING"),
            BootState::Stage2Connected => write!(f, "STAGE2_CONNECTED"),
            BootState::Stage2Loaded => write!(f, "STAGE2_LOADED"),
            BootState::Stage2Exec => write!(f, "STAGE2_EXEC"),
            BootState::Ready => write!(f, "READY"),
            BootState::Aborted(reason) => write!(f, "ABORTED ({reason})"),
        }
    }
}

impl BootState {
    /// Checksum mode the device side expects in this state.
    pub fn checksum_mode(&self) -> ChecksumMode {
        match self {
            BootState::Probing
            | BootState::Connected
            | BootState::Stage1Loaded
            | BootState::Stage1Exec => ChecksumMode::Crc,
            _ => ChecksumMode::InternetSum,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BootState::Ready | BootState::Aborted(_))
    }
}

/// Bring-up context: current state plus every state passed through.
#[derive(Debug, Default)]
pub struct BootMachine {
    state: BootState,
    history: Vec<BootState>,
}

impl BootMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &BootState {
        &self.state
    }

    /// States left so far, oldest first.
    pub fn history(&self) -> &[BootState] {
        &self.history
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, new_state: BootState) {
        tracing::info!(from = %self.state, to = %new_state, "State transition");
        let old = std::mem::replace(&mut self.state, new_state);
        self.history.push(old);
    }

    pub fn abort(&mut self, reason: impl Into<String>) {
        self.goto_state(BootState::Aborted(reason.into()));
    }

    pub fn is_ready(&self) -> bool {
        self.state == BootState::Ready
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, BootState::Aborted(_))
    }
}
