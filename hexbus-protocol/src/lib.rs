//! # Hexbus Protocol Library
//!
//! Wire format of the hexbus protocol, a textual request/response bus that turns
//! a byte stream (a UART or a TCP socket) into addressed 32-bit register reads
//! and writes on an FPGA.
//!
//! ## Overview
//!
//! Every message is a *token*: a single uppercase tag character followed by an
//! optional run of lowercase hexadecimal digits. There are no length prefixes
//! and no explicit message boundaries. A token ends at the next byte that is not
//! a hex digit.
//!
//! This crate provides:
//!
//! - The protocol vocabulary: [`Tag`], [`Token`], [`Command`] (host to device)
//!   and [`Response`] (device to host)
//! - The [`codec::Lexer`], which rebuilds tokens from raw bytes and drops idle filler
//! - [`BusFault`], the recoverable error shared by host and device code
//!
//! ## Message Format
//!
//! | Tag | Meaning | Payload |
//! |-----|---------|---------|
//! | `A` | set/announce address | 8 hex digits, low bit suppresses auto-increment |
//! | `R` | read request / read datum | request: none, datum: hex digits (none for zero) |
//! | `W` | write word | hex digits (none for zero) |
//! | `K` | write acknowledged | none |
//! | `T` | bus reset | none |
//! | `I` | interrupt | none |
//! | `E` | bus error | none |
//! | `Z` | device idle | none |
//!
//! Bytes with all low seven bits set (`0x7f`, `0xff`) are idle filler and carry
//! no meaning wherever they appear.
//!
//! ## Basic Usage
//!
//! ### Encoding Commands
//!
//! ```
//! use bytes::BytesMut;
//! use hexbus_protocol::Command;
//!
//! let mut buf = BytesMut::new();
//! Command::SetAddress { address: 0x2000, increment: true }.encode(&mut buf);
//! Command::Write(0x1234).encode(&mut buf);
//! Command::Write(0).encode(&mut buf);
//! assert_eq!(&buf[..], b"A00002000W1234\nW\n");
//! ```
//!
//! ### Decoding Responses
//!
//! ```
//! use hexbus_protocol::{Tag, Token, codec::Lexer};
//!
//! let mut lexer = Lexer::new();
//! let tokens: Vec<Token> = b"Rcafe\x7f\nK\n"
//!     .iter()
//!     .filter_map(|b| lexer.push(*b))
//!     .collect();
//! assert_eq!(tokens, vec![Token::new(Tag::Read, 0xcafe), Token::new(Tag::Ack, 0)]);
//! ```
//!
//! ## Features
//!
//! - `tokio`: provides [`codec::HexbusCodec`], a `tokio_util` decoder yielding tokens.

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
pub use error::{BusFault, FaultCause};
