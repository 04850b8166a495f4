//! Map transfer node: wires the sans-IO transfer engine to a transport and
//! a durable store, and drives a connection to completion (C6).
//!
//! # Components
//!
//! - [`coordinator`]: [`coordinator::SessionCoordinator`], the single entry
//!   point from the transport — one `process_event` call in, a list of
//!   actions out.
//! - [`driver`]: the async loop executing those actions against a real
//!   [`transport::Transport`].
//! - [`transport`]: the byte-duplex contract standing in for the BLE GATT
//!   link, plus [`transport::LoopbackTransport`] for tests and the demo
//!   binary.
//! - [`system_env`]: [`system_env::SystemEnv`], the production
//!   [`maptransfer_engine::Environment`].
//! - [`config`]: [`config::TransferConfig`], TOML-loadable node policy.
//! - [`error`]: [`error::CoordinatorError`], the unified error vocabulary
//!   across C2-C5.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod system_env;
pub mod transport;

pub use config::{ConfigError, TransferConfig};
pub use coordinator::{CoordinatorAction, CoordinatorConfig, CoordinatorEvent, SessionCoordinator};
pub use driver::run;
pub use error::CoordinatorError;
pub use system_env::SystemEnv;
pub use transport::{Channel, LoopbackTransport, Transport, TransportError};
