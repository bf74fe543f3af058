//! Execution-and-presentation driver for a CHIP-8 style machine.
//!
//! ## Design
//!
//! * the machine itself (CPU, memory, timers) is someone else's; the driver
//!   only sees the small `Machine` trait
//! * single threaded, driven entirely by host events: keys, a refresh
//!   callback, and completion of ROM fetches
//! * run/pause/step is a plain state machine that hands back actions, so it
//!   can be tested without a host
//! * display abstracted so alternatives plug in; a TUI one is provided
//!
//! Model
//!
//! EmulatorDriver
//!  |-- machine (external)
//!  |-- keymap + key indicator        host key -> machine key line
//!  |-- run controller                Stopped / Running, refresh requests
//!  |-- frame renderer + raster       frame buffer -> scaled pixels
//!  |-- display                       raster + panel -> screen
//!  `-- fetch outbox                  ROM names the host should go and get
//!
//! Host loop (see `term::run`)
//!  |-- serve outstanding ROM fetches -> HostEvent::RomFetched
//!  |-- expire held keys, drain input -> HostEvent::Key / commands
//!  `-- if the driver wants a refresh -> HostEvent::Refresh
pub mod control;
pub mod display;
pub mod driver;
pub mod keypad;
pub mod machine;
pub mod rom;
pub mod term;

#[cfg(test)]
mod testing;

pub use control::RunState;
pub use driver::{DriverConfig, DriverError, EmulatorDriver, HostEvent};
pub use keypad::{Edge, LogicalKey};
pub use machine::Machine;
