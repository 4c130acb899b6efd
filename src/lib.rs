// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [Modbus](https://en.wikipedia.org/wiki/Modbus) master and slave sessions
//! based on [tokio](https://tokio.rs).
//!
//! A [`MasterSession`] issues typed requests to a single slave at a time, a
//! [`SlaveSession`] answers requests from an in-memory [`Mapping`] of the
//! four Modbus address spaces. Both sit on top of a [`Transport`] that only
//! moves bytes: a serial line ([`transport::rtu`], feature `rtu`) or a TCP
//! connection ([`transport::tcp`], feature `tcp`).
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! modbus-session = "*"
//! ```
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "tcp")]
//! # async fn read() -> Result<(), Box<dyn std::error::Error>> {
//! use modbus_session::{prelude::*, transport::tcp::TcpTransport};
//!
//! let mut master = MasterSession::new(TcpTransport::new("192.168.0.222", 502));
//! master.set_error_recovery(ErrorRecoveryMode::LINK | ErrorRecoveryMode::PROTOCOL);
//! master.connect().await?;
//! let words = master.read_registers(0x1000, 2).await?;
//! println!("{}", modbus_session::convert::decode_float([words[0], words[1]]));
//! master.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![warn(missing_debug_implementations)]
#![warn(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use bytes;

pub mod prelude;

pub mod client;
pub mod convert;
pub mod server;
pub mod transport;

mod codec;
mod context;
mod error;
mod frame;
mod recovery;
mod slave;

pub use self::{
    client::MasterSession,
    context::{Context, DEFAULT_BYTE_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT},
    error::{Error, ProtocolError, TransportError},
    frame::{
        Address, Coil, ExceptionCode, ExceptionResponse, FunctionCode, Quantity, Request,
        Response, Word, MAX_READ_BITS, MAX_READ_REGISTERS, MAX_WRITE_BITS, MAX_WRITE_REGISTERS,
        MAX_WR_READ_REGISTERS, MAX_WR_WRITE_REGISTERS,
    },
    recovery::{decide, ErrorRecoveryMode, Recovery},
    server::{Mapping, SlaveSession},
    slave::{Slave, SlaveId},
    transport::{Backend, Transport},
};

/// Specialized [`std::result::Result`] type for Modbus sessions.
pub type Result<T> = std::result::Result<T, Error>;

/// Version of this crate, e.g. `"0.1.0"`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Whether this crate is at least version `major.minor.patch`.
#[must_use]
pub fn version_at_least(major: u32, minor: u32, patch: u32) -> bool {
    let current = [
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    ]
    .map(|part| part.parse::<u32>().unwrap_or(0));
    current >= [major, minor, patch]
}
