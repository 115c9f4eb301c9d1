//! Raw byte transport to the device's bulk endpoints.
//!
//! The exchange layer only sees [`UsbTransport`]; `nusb` backs real
//! hardware and [`MockTransport`] backs the tests.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockTransport, reply_wire};
pub use nusb::NusbTransport;
pub use traits::{TransportError, UsbTransport};
