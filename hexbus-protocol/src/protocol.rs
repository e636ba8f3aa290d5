use std::fmt::{Display, Write};

use bytes::{BufMut, BytesMut};

/// A bus word. Both register addresses and register values are 32 bits wide.
pub type Word = u32;

/// Out-of-band command tags. Every token on the wire starts with one of these,
/// optionally followed by lowercase hexadecimal digits.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Tag {
    /// `A`: sets (host) or announces (device) the bus address.
    /// The low bit of the payload suppresses auto-increment.
    Address,
    /// `R`: read request (host) or read datum (device).
    Read,
    /// `W`: write a word at the current address.
    Write,
    /// `K`: write acknowledgement.
    Ack,
    /// `T`: the device side of the bus was reset.
    Reset,
    /// `I`: interrupt notification.
    Interrupt,
    /// `E`: bus error.
    Error,
    /// `Z`: the device is idle.
    Idle,
    /// Any other non-hex, non-whitespace byte. Carries no meaning.
    Other(u8),
}

impl Tag {
    pub fn from_byte(byte: u8) -> Tag {
        match byte {
            b'A' => Tag::Address,
            b'R' => Tag::Read,
            b'W' => Tag::Write,
            b'K' => Tag::Ack,
            b'T' => Tag::Reset,
            b'I' => Tag::Interrupt,
            b'E' => Tag::Error,
            b'Z' => Tag::Idle,
            other => Tag::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Tag::Address => b'A',
            Tag::Read => b'R',
            Tag::Write => b'W',
            Tag::Ack => b'K',
            Tag::Reset => b'T',
            Tag::Interrupt => b'I',
            Tag::Error => b'E',
            Tag::Idle => b'Z',
            Tag::Other(byte) => *byte,
        }
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_byte().escape_ascii())
    }
}

#[test]
fn tag_bytes_are_symmetric() {
    for byte in b"ARWKTIEZ?" {
        assert_eq!(Tag::from_byte(*byte).as_byte(), *byte);
    }
    assert_eq!(Tag::from_byte(b'Q'), Tag::Other(b'Q'));
}

/// A completed token: the tag that opened it and the value of the hex digits
/// that followed. A tag without digits has the value zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub tag: Tag,
    pub value: Word,
}

impl Token {
    pub fn new(tag: Tag, value: Word) -> Token {
        Token { tag, value }
    }
}

const TERMINATOR: u8 = b'\n';

/// Appends a tag and its payload. Zero is sent as the bare tag.
fn put_tagged(dst: &mut BytesMut, tag: Tag, value: Word) {
    dst.put_u8(tag.as_byte());
    if value != 0 {
        // Writing into a BytesMut cannot fail
        let _ = write!(dst, "{:x}", value);
    }
    dst.put_u8(TERMINATOR);
}

/// A command is sent from the host to the device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Selects the address subsequent reads and writes apply to.
    /// The address is always sent as all eight hex digits and is not terminated:
    /// the following command's tag ends it.
    SetAddress { address: Word, increment: bool },
    /// Requests the word at the current address.
    Read,
    /// Writes a word to the current address.
    Write(Word),
}

impl Command {
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Command::SetAddress { address, increment } => {
                let raw = (address & !3) | if *increment { 0 } else { 1 };
                dst.put_u8(Tag::Address.as_byte());
                let _ = write!(dst, "{:08x}", raw);
            }
            Command::Read => {
                dst.put_u8(Tag::Read.as_byte());
                dst.put_u8(TERMINATOR);
            }
            Command::Write(value) => put_tagged(dst, Tag::Write, *value),
        }
    }
}

/// A response is sent from the device to the host, either as an answer to a
/// command or unsolicited.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Announces the current address. The raw value keeps the no-increment bit.
    Address(Word),
    ReadData(Word),
    Ack,
    Reset,
    Interrupt,
    Error,
    Idle,
}

impl Response {
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Response::Address(raw) => {
                dst.put_u8(Tag::Address.as_byte());
                let _ = write!(dst, "{:08x}", raw);
                dst.put_u8(TERMINATOR);
            }
            Response::ReadData(value) => put_tagged(dst, Tag::Read, *value),
            Response::Ack => put_tagged(dst, Tag::Ack, 0),
            Response::Reset => put_tagged(dst, Tag::Reset, 0),
            Response::Interrupt => put_tagged(dst, Tag::Interrupt, 0),
            Response::Error => put_tagged(dst, Tag::Error, 0),
            Response::Idle => put_tagged(dst, Tag::Idle, 0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode_command(cmd: Command) -> BytesMut {
        let mut out = BytesMut::new();
        cmd.encode(&mut out);
        out
    }

    #[test]
    fn address_with_increment_clears_low_bit() {
        let out = encode_command(Command::SetAddress {
            address: 0x0000_1000,
            increment: true,
        });
        assert_eq!(&out[..], b"A00001000");
    }

    #[test]
    fn address_without_increment_sets_low_bit() {
        let out = encode_command(Command::SetAddress {
            address: 0xdead_beec,
            increment: false,
        });
        assert_eq!(&out[..], b"Adeadbeed");
    }

    #[test]
    fn read_request_has_no_payload() {
        assert_eq!(&encode_command(Command::Read)[..], b"R\n");
    }

    #[test]
    fn write_has_no_leading_zeros() {
        assert_eq!(&encode_command(Command::Write(0x1f))[..], b"W1f\n");
        assert_eq!(
            &encode_command(Command::Write(0xffff_ffff))[..],
            b"Wffffffff\n"
        );
    }

    #[test]
    fn write_of_zero_is_bare_tag() {
        assert_eq!(&encode_command(Command::Write(0))[..], b"W\n");
    }

    #[test]
    fn responses() {
        let mut out = BytesMut::new();
        Response::Address(0x101).encode(&mut out);
        Response::ReadData(0).encode(&mut out);
        Response::ReadData(0xabc).encode(&mut out);
        Response::Ack.encode(&mut out);
        Response::Interrupt.encode(&mut out);
        Response::Error.encode(&mut out);
        Response::Idle.encode(&mut out);
        Response::Reset.encode(&mut out);
        assert_eq!(&out[..], b"A00000101\nR\nRabc\nK\nI\nE\nZ\nT\n");
    }
}
