//! # Hexbus Server Library
//!
//! This crate implements the device end of the hexbus protocol, so host tooling
//! can be exercised without an FPGA attached.
//!
//! ## Overview
//!
//! On hardware, a small state machine behind a UART receives hexbus commands
//! and turns them into bus cycles. This crate provides the same behavior in
//! software, on top of a pluggable register model.
//!
//! ## Architecture
//!
//! The crate is built around three components:
//!
//! - **[`Device`] Trait**: the register model. It answers word reads and writes
//!   and may raise interrupts
//! - **[`responder::Responder`]**: the synchronous device-side protocol state
//!   machine. It tracks the current address and auto-increment mode and encodes
//!   replies. It has no I/O of its own, so it can be driven from tests directly
//! - **[`server::Server`]**: an async TCP server that feeds host bytes through
//!   the protocol lexer into a responder and writes the replies back
//!
//! [`device::RegisterFile`] is a ready-made sparse in-memory [`Device`].
//!
//! ## Basic Usage
//!
//! ```ignore
//! use hexbus_server::{device::RegisterFile, server::Builder};
//! use std::time::Duration;
//!
//! let device = RegisterFile::new().with_fault(0xdead_0000);
//! let mut server = Builder::new()
//!     .idle_interval(Duration::from_secs(1))
//!     .build(device);
//! server.listen("127.0.0.1:8363").await?;
//! ```
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics: connections at `info`,
//! every handled token at `debug`, and client failures at `error`.
//!
//! ## Thread Model
//!
//! The server handles one client connection at a time, matching a physical
//! serial link which has exactly one host.
pub mod device;
pub mod responder;
pub mod server;

use hexbus_protocol::{BusFault, Word};

/// Register model behind the emulated bus.
///
/// Addresses passed in are always 4-byte aligned.
pub trait Device {
    /// Read the word at `address`.
    ///
    /// Returning an error makes the responder answer with an `E` token.
    fn read(&mut self, address: Word) -> Result<Word, BusFault>;

    /// Write `value` to `address`.
    ///
    /// Returning an error makes the responder answer with an `E` token
    /// instead of an acknowledgement.
    fn write(&mut self, address: Word, value: Word) -> Result<(), BusFault>;

    /// Returns whether an interrupt is pending and clears it.
    ///
    /// Checked after every command and on every idle tick.
    fn take_interrupt(&mut self) -> bool {
        false
    }
}
