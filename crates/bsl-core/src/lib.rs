//! BSL-Core: Spreadtrum BSL USB download protocol in Rust.
//!
//! This crate drives a Spreadtrum device in download mode: it brings the
//! device from the boot ROM through the two RAM loaders (FDL1, FDL2) and then
//! reads and writes flash partitions through FDL2.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Command/reply codes, checksums, byte stuffing, frames
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Exchange**: Request/response round trips with bounded retries
//! - **State**: Boot ROM -> FDL1 -> FDL2 bring-up
//! - **Transfer**: Windowed partition upload and download
//! - **Block device**: Fixed-geometry read-only view of a partition
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use bsl_core::session::{BslSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     fdl1_path: "fdl1.bin".into(),
//!     fdl2_path: "fdl2.bin".into(),
//!     ..Default::default()
//! };
//!
//! let session = BslSession::open(config).expect("no device");
//! session.ready().expect("bring-up failed");
//! session
//!     .read_partition("boot", 16 * 1024 * 1024, "boot.img".as_ref())
//!     .expect("read failed");
//! ```

pub mod blockdev;
pub mod error;
pub mod events;
pub mod exchange;
pub mod partition;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use blockdev::{BlockDevice, PartitionBlockDevice};
pub use error::{BslError, BslResult, ParamError, ProtocolError};
pub use events::{BslEvent, BslObserver, BslPhase, NullObserver, TracingObserver};
pub use exchange::{ExchangePolicy, FrameExchange};
pub use partition::{PARTITIONS, parse_size};
pub use protocol::{ChecksumMode, Command, Frame, FrameError, Reply};
pub use session::{BslSession, SessionConfig};
pub use state::{BootReport, BootState, Bootstrap, LoaderImage};
pub use transfer::{DownloadTarget, TransferSummary, TransferWindow};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
