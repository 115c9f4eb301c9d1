//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to follow bring-up and transfers
//! without tight coupling to the core logic.

use std::fmt;

/// Session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BslPhase {
    /// Waiting for device connection.
    WaitingForDevice,
    /// Boot ROM handshake and FDL1 load.
    BootRom,
    /// FDL1 handshake and FDL2 load.
    Loader,
    /// FDL2 running, partitions addressable.
    Ready,
    /// Reading a partition from the device.
    Upload,
    /// Writing a partition or loader to the device.
    Download,
    /// Device is resetting or powering down.
    DeviceReset,
    /// All operations complete.
    Complete,
    /// Error state.
    Error,
}

impl fmt::Display for BslPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BslPhase::WaitingForDevice => write!(f, "Waiting for Device"),
            BslPhase::BootRom => write!(f, "Boot ROM"),
            BslPhase::Loader => write!(f, "Loader"),
            BslPhase::Ready => write!(f, "Ready"),
            BslPhase::Upload => write!(f, "Upload"),
            BslPhase::Download => write!(f, "Download"),
            BslPhase::DeviceReset => write!(f, "Device Reset"),
            BslPhase::Complete => write!(f, "Complete"),
            BslPhase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted by a BSL session.
#[derive(Debug, Clone)]
pub enum BslEvent {
    /// Device connected.
    DeviceConnected { vid: u16, pid: u16 },
    /// Phase changed.
    PhaseChanged { from: BslPhase, to: BslPhase },
    /// Boot ROM or loader answered the version probe.
    VersionReported { phase: BslPhase, version: String },
    /// Progress update, emitted when the integer percentage changes.
    Progress {
        phase: BslPhase,
        operation: String,
        current: u64,
        total: u64,
    },
    /// Error occurred.
    Error { message: String },
    /// USB Packet sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// All operations completed successfully.
    Complete,
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait BslObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &BslEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl BslObserver for NullObserver {
    fn on_event(&self, _event: &BslEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl BslObserver for TracingObserver {
    fn on_event(&self, event: &BslEvent) {
        match event {
            BslEvent::DeviceConnected { vid, pid } => {
                tracing::info!(
                    vid = %format!("{:04X}", vid),
                    pid = %format!("{:04X}", pid),
                    "Device connected"
                );
            }
            BslEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            BslEvent::VersionReported { phase, version } => {
                tracing::info!(phase = %phase, version = %version, "Version");
            }
            BslEvent::Progress {
                phase,
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::info!(
                    phase = %phase,
                    operation = %operation,
                    progress = %format!("{}%", pct),
                    "Progress"
                );
            }
            BslEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            BslEvent::Packet {
                direction,
                length,
                data,
            } => {
                tracing::trace!(
                    dir = %direction,
                    len = length,
                    head = ?data,
                    "USB Packet"
                );
            }
            BslEvent::Complete => {
                tracing::info!("Operation complete");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Observer that records every event for assertions.
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: Mutex<Vec<BslEvent>>,
    }

    impl RecordingObserver {
        pub fn progress_values(&self) -> Vec<u64> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    BslEvent::Progress { current, total, .. } => Some(current * 100 / total),
                    _ => None,
                })
                .collect()
        }

        pub fn versions(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    BslEvent::VersionReported { version, .. } => Some(version.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl BslObserver for RecordingObserver {
        fn on_event(&self, event: &BslEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingObserver;
    use super::*;

    #[test]
    fn test_tracing_observer_handles_every_event() {
        let events = [
            BslEvent::DeviceConnected {
                vid: 0x1782,
                pid: 0x4D00,
            },
            BslEvent::PhaseChanged {
                from: BslPhase::BootRom,
                to: BslPhase::Loader,
            },
            BslEvent::VersionReported {
                phase: BslPhase::BootRom,
                version: "SPRD3".into(),
            },
            BslEvent::Progress {
                phase: BslPhase::Upload,
                operation: "boot".into(),
                current: 0x80_0000,
                total: 0x100_0000,
            },
            BslEvent::Error {
                message: "timeout".into(),
            },
            BslEvent::Packet {
                direction: PacketDirection::Rx,
                length: 8,
                data: Some(vec![0x7E; 8]),
            },
            BslEvent::Complete,
        ];
        let recorder = RecordingObserver::default();
        for event in &events {
            TracingObserver.on_event(event);
            recorder.on_event(event);
        }
        assert_eq!(recorder.events.lock().unwrap().len(), events.len());
        assert_eq!(recorder.progress_values(), [50]);
        assert_eq!(recorder.versions(), ["SPRD3"]);
    }
}
