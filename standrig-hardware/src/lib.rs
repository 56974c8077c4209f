//! standrig-hardware
//!
//! Instrument abstraction crate that contains the low-level transports and the
//! high-level PSU controller logic. This crate is intended to be used by the
//! test runner to drive bench power supplies.
//
//! Public API:
//! - `psu_controller::PsuController`: high-level controller for one PSU channel
//! - `transport::InstrumentTransport`: line-oriented command channel
//! - `serial_driver::SerialDriver` / `socket_driver::SocketDriver`: the two transports
//! - `mock::MockInstrument`: scriptable fake instrument for tests

pub mod mock;
pub mod psu_controller;
pub mod scpi;
pub mod serial_driver;
pub mod socket_driver;
pub mod transport;

pub use psu_controller::PsuController;
pub use scpi::{parse_float, ScpiCommand};
pub use serial_driver::SerialDriver;
pub use socket_driver::{socket_endpoint, SocketDriver};
pub use transport::{open_transport, InstrumentTransport};

