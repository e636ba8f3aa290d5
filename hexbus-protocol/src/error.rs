use std::fmt::Display;

use thiserror::Error;

use crate::protocol::Word;

/// Why a bus transaction failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultCause {
    /// The device answered with an `E` token.
    Remote,
    /// The device kept reporting idle while a read was pending.
    Unresponsive,
}

impl Display for FaultCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultCause::Remote => write!(f, "device reported a bus error"),
            FaultCause::Unresponsive => write!(f, "device is not responding"),
        }
    }
}

/// A failed bus transaction. Faults are recoverable: the link stays in sync
/// and the caller may retry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("bus fault at 0x{address:08x}: {cause}")]
pub struct BusFault {
    pub address: Word,
    pub cause: FaultCause,
}

impl BusFault {
    pub fn remote(address: Word) -> BusFault {
        BusFault {
            address,
            cause: FaultCause::Remote,
        }
    }

    /// The device stopped responding. There is no meaningful address.
    pub fn unresponsive() -> BusFault {
        BusFault {
            address: 0,
            cause: FaultCause::Unresponsive,
        }
    }
}

#[test]
fn fault_display() {
    assert_eq!(
        BusFault::remote(0x1000).to_string(),
        "bus fault at 0x00001000: device reported a bus error"
    );
    assert_eq!(BusFault::unresponsive().address, 0);
}
