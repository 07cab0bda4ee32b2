#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Transports that carry register traffic to the generator controller.
//!
//! - [`RtuTransport`]: Modbus-RTU framing over a byte link (TCP serial bridge)
//! - [`SimulatedController`]: in-memory register map for tests and demos

pub mod error;
pub mod rtu;
pub mod sim;
pub mod util;

pub use rtu::{DEFAULT_SLAVE_ADDRESS, Link, RtuTransport};
pub use sim::{SimHandle, SimulatedController, SlaveLink, WriteRecord};
