#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Generator monitor core (transport-agnostic).
//!
//! Everything that talks to the controller goes through
//! `genmon_traits::Transport`; notices leave through `genmon_traits::Notifier`.
//!
//! ## Architecture
//!
//! - **Registers**: static register tables and log windows (`registers`)
//! - **Store**: validated register cache with change tracking (`store`)
//! - **Decoding**: engine, switch, alarm, line and service facts (`decode`, `logs`)
//! - **Identity**: controller family detection and model defaults (`identity`)
//! - **Scheduling**: master-emulation request order (`scheduler`)
//! - **Outage / Power**: utility outage tracking and the kW history (`outage`, `power`)
//! - **Reports**: report trees with text and JSON renderers (`report`, `status`)
//! - **Commands**: the `generator:` text protocol and write encodings (`commands`)
//! - **Runtime**: the shared device context, loops and TCP server
//!   (`device`, `orchestrator`, `server`)
//!
//! ## Threading
//!
//! Each loop runs on its own named thread (`worker`). The link is serialised
//! by one re-entrant lock; the store sits behind a read/write lock so the
//! server always reads a consistent snapshot.

pub mod applog;
pub mod commands;
pub mod decode;
pub mod device;
pub mod error;
pub mod feedback;
pub mod identity;
pub mod logs;
pub mod mocks;
pub mod orchestrator;
pub mod outage;
pub mod power;
pub mod registers;
pub mod report;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod store;
pub mod util;
pub mod worker;

pub use device::Device;
pub use error::{GenmonError, Result};
pub use orchestrator::{ConfigSource, Monitor, TransportFactory};
pub use report::Node;
pub use server::CommandServer;
pub use store::{RegisterStore, RegisterView};
