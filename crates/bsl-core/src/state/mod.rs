//! Device bring-up state machine.

pub mod bootstrap;
pub mod machine;

pub use bootstrap::{BootReport, Bootstrap, LoaderImage};
pub use machine::{BootMachine, BootState};
