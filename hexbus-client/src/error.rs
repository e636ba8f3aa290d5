use std::io;

use hexbus_protocol::{BusFault, Word};
use thiserror::Error;

/// Errors that may occur during a bus transaction.
#[derive(Debug, Error)]
pub enum BusError {
    /// The device reported a bus error, or stopped responding to a read.
    #[error(transparent)]
    Fault(#[from] BusFault),
    /// The address the device reports does not match the address the host
    /// expects after a transfer. The byte stream can no longer be trusted.
    #[error("protocol desync: expected address 0x{expected:08x}, device is at 0x{actual:08x}")]
    Desync { expected: Word, actual: Word },
    /// The transport reported an orderly close.
    #[error("connection closed by remote")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("address 0x{address:08x} is not 4-byte aligned")]
    Unaligned { address: Word },
    /// An earlier fatal error closed the connection.
    #[error("connection is no longer usable")]
    ConnectionLost,
}

impl BusError {
    /// Fatal errors end the connection; every later call fails with
    /// [BusError::ConnectionLost].
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BusError::Fault(_) | BusError::Unaligned { .. })
    }

    /// The bus fault, if this is a recoverable device error.
    pub fn fault(&self) -> Option<&BusFault> {
        match self {
            BusError::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

#[test]
fn fatal_classification() {
    assert!(!BusError::Fault(BusFault::remote(4)).is_fatal());
    assert!(!BusError::Unaligned { address: 3 }.is_fatal());
    assert!(BusError::Closed.is_fatal());
    assert!(
        BusError::Desync {
            expected: 8,
            actual: 4
        }
        .is_fatal()
    );
    assert!(BusError::Io(io::Error::other("broken")).is_fatal());
}
