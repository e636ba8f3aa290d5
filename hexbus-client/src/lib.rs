//! # Hexbus Client
//!
//! A Rust library for commanding an FPGA over the hexbus protocol: addressed
//! 32-bit register reads and writes over a serial line or a TCP socket.
//!
//! ## Overview
//!
//! The device end of the link is a small bus master inside the FPGA, fed by a
//! UART. This crate is the host end. It encodes register operations into hexbus
//! commands and decodes the device's replies. Along the way it handles
//! interleaved acknowledgements, idle filler, bus resets, interrupts and bus
//! errors.
//!
//! Every operation blocks until it completes or fails. There are no background
//! threads: decoding happens inside the call that waits for a reply.
//!
//! ## Basic Usage
//!
//! ### Connecting
//!
//! ```ignore
//! use hexbus_client::{HexBus, transport::TcpTransport};
//!
//! let mut bus = HexBus::new(TcpTransport::connect("127.0.0.1:8363")?);
//! ```
//!
//! ### Register Access
//!
//! ```ignore
//! let version = bus.read(0x0000_0100)?;
//! bus.write(0x0000_0104, 0x1)?;
//!
//! // Consecutive registers, address auto-increments
//! bus.write_block(0x0001_0000, &[1, 2, 3, 4])?;
//! let words = bus.read_block(0x0001_0000, 4)?;
//!
//! // A FIFO behind a single address
//! let samples = bus.read_same(0x0000_0200, 1024)?;
//! ```
//!
//! ### Interrupts
//!
//! ```ignore
//! bus.wait_interrupt()?;
//! bus.clear_interrupt();
//! ```
//!
//! ## Error Handling
//!
//! Operations return [`BusError`]. A [`BusError::Fault`] means the device
//! reported a bus error, or stopped responding to a read. It is recoverable and
//! never retried automatically. Losing the connection or protocol sync is
//! fatal. The transport is closed, and every later call returns
//! [`BusError::ConnectionLost`]. By default a protocol desync also terminates
//! the process, see [`Config::abort_on_desync`].
//!
//! ## Logging
//!
//! This crate uses the `log` crate. At `trace` level every transmitted command
//! and received token is logged.
//!
//! ## Thread Safety
//!
//! A [`HexBus`] owns its connection and is used through `&mut self`. Sharing one
//! connection between threads requires external synchronization.
pub mod config;
mod engine;
pub mod error;
#[cfg(test)]
mod sim;
pub mod transport;

use std::{io, net::ToSocketAddrs, path::Path, time::Duration};

pub use config::{Builder, Config};
pub use error::BusError;
pub use hexbus_protocol::{BusFault, FaultCause, Word};

use engine::Engine;
use transport::{SerialTransport, TcpTransport, Transport};

/// Hexbus master for remote register access.
pub struct HexBus<T: Transport> {
    engine: Engine<T>,
}

impl HexBus<TcpTransport> {
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<HexBus<TcpTransport>> {
        Ok(HexBus::new(TcpTransport::connect(addr)?))
    }
}

impl HexBus<SerialTransport> {
    pub fn open_serial(path: impl AsRef<Path>, baud: u32) -> io::Result<HexBus<SerialTransport>> {
        Ok(HexBus::new(SerialTransport::open(path, baud)?))
    }
}

impl<T: Transport> HexBus<T> {
    /// Bind to an open transport with the default [Config].
    pub fn new(transport: T) -> HexBus<T> {
        HexBus::with_config(transport, Config::default())
    }

    pub fn with_config(transport: T, config: Config) -> HexBus<T> {
        HexBus {
            engine: Engine::new(transport, config),
        }
    }

    /// Read a single register.
    pub fn read(&mut self, address: Word) -> Result<Word, BusError> {
        self.engine.read_word(address)
    }

    /// Write a single register.
    pub fn write(&mut self, address: Word, value: Word) -> Result<(), BusError> {
        self.engine.write_vector(address, &[value], false)
    }

    /// Read `count` consecutive registers starting at `address`.
    pub fn read_block(&mut self, address: Word, count: usize) -> Result<Vec<Word>, BusError> {
        self.engine.read_vector(address, count, true)
    }

    /// Read `count` times from the same register.
    pub fn read_same(&mut self, address: Word, count: usize) -> Result<Vec<Word>, BusError> {
        self.engine.read_vector(address, count, false)
    }

    /// Write consecutive registers starting at `address`.
    pub fn write_block(&mut self, address: Word, words: &[Word]) -> Result<(), BusError> {
        self.engine.write_vector(address, words, true)
    }

    /// Write all `words` to the same register, in order.
    pub fn write_same(&mut self, address: Word, words: &[Word]) -> Result<(), BusError> {
        self.engine.write_vector(address, words, false)
    }

    /// Whether an interrupt notification has been received. Does not clear it.
    pub fn poll_interrupt(&self) -> bool {
        self.engine.state.interrupt
    }

    pub fn clear_interrupt(&mut self) {
        self.engine.state.interrupt = false;
    }

    /// Block until the device raises an interrupt.
    pub fn wait_interrupt(&mut self) -> Result<(), BusError> {
        self.engine.wait_for_interrupt(None).map(|_| ())
    }

    /// Block until the device raises an interrupt or `timeout` passes.
    /// Returns whether an interrupt was received.
    pub fn wait_interrupt_timeout(&mut self, timeout: Duration) -> Result<bool, BusError> {
        self.engine.wait_for_interrupt(Some(timeout))
    }

    /// Whether the device reported a bus error since the last bus reset or
    /// [HexBus::clear_bus_error].
    pub fn has_bus_error(&self) -> bool {
        self.engine.state.bus_error
    }

    pub fn clear_bus_error(&mut self) {
        self.engine.state.bus_error = false;
    }

    /// Bytes received from the transport so far, idle filler included.
    pub fn total_bytes_read(&self) -> u64 {
        self.engine.total_read()
    }

    /// False once a fatal error has closed the connection.
    pub fn is_usable(&self) -> bool {
        self.engine.is_usable()
    }

    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }

    /// Close the underlying transport. Dropping the bus does the same.
    pub fn close(mut self) -> io::Result<()> {
        self.engine.close()
    }
}
