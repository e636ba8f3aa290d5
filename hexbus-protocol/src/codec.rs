/// Classification of inbound bytes into protocol tokens
use crate::protocol::{Tag, Token, Word};

/// Keepalive padding inserted by the transport. Any byte with all of its low
/// seven bits set is dropped before classification.
pub fn is_idle_filler(byte: u8) -> bool {
    byte & 0x7f == 0x7f
}

/// Value of a lowercase hexadecimal digit. Uppercase letters are tags.
pub fn hex_nibble(byte: u8) -> Option<Word> {
    match byte {
        b'0'..=b'9' => Some((byte - b'0') as Word),
        b'a'..=b'f' => Some((byte - b'a' + 10) as Word),
        _ => None,
    }
}

/// Reconstructs tokens from a stream of bytes that has no explicit framing.
///
/// A token is a tag followed by any number of hex digits. It is completed by
/// the next byte that is neither a hex digit nor idle filler. When that byte is
/// itself a tag, it opens the next token; whitespace only terminates, and runs
/// of whitespace collapse into a single separator.
///
/// The lexer is used on both ends of the link: the host feeds it responses
/// from the device, the device emulator feeds it commands from the host.
#[derive(Clone, Debug, Default)]
pub struct Lexer {
    tag: Option<Tag>,
    value: Word,
    open: bool,
}

impl Lexer {
    pub fn new() -> Lexer {
        Lexer::default()
    }

    /// Feeds one byte, returning the token it completed, if any.
    pub fn push(&mut self, byte: u8) -> Option<Token> {
        if is_idle_filler(byte) {
            return None;
        }
        if let Some(nibble) = hex_nibble(byte) {
            self.value = (self.value << 4) | nibble;
            self.open = true;
            return None;
        }

        let completed = if self.open {
            self.tag.map(|tag| Token::new(tag, self.value))
        } else {
            None
        };

        if byte.is_ascii_whitespace() {
            self.open = false;
        } else {
            self.tag = Some(Tag::from_byte(byte));
            self.open = true;
        }
        self.value = 0;
        completed
    }

    /// The tag of the token currently being accumulated.
    pub fn current_tag(&self) -> Option<Tag> {
        self.tag
    }

    /// Forgets any partial token and the current tag.
    pub fn reset(&mut self) {
        *self = Lexer::default();
    }
}

#[cfg(feature = "tokio")]
pub use framed::HexbusCodec;

#[cfg(feature = "tokio")]
mod framed {
    use std::io;

    use bytes::{Buf, BytesMut};
    use tokio_util::codec::Decoder;

    use super::Lexer;
    use crate::protocol::Token;

    /// Adapts the [Lexer] to `tokio_util`'s framing.
    ///
    /// Consumed bytes of an incomplete token are kept in the lexer, not in the
    /// source buffer.
    #[derive(Clone, Debug, Default)]
    pub struct HexbusCodec {
        lexer: Lexer,
    }

    impl HexbusCodec {
        pub fn new() -> HexbusCodec {
            HexbusCodec::default()
        }
    }

    impl Decoder for HexbusCodec {
        type Item = Token;
        type Error = io::Error;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Token>, io::Error> {
            while src.has_remaining() {
                if let Some(token) = self.lexer.push(src.get_u8()) {
                    return Ok(Some(token));
                }
            }
            Ok(None)
        }
    }

    #[test]
    fn decodes_across_buffer_boundaries() {
        let mut codec = HexbusCodec::new();
        let mut buf = BytesMut::from(&b"A0000"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.extend_from_slice(b"1000R\nW5\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Token::new(crate::Tag::Address, 0x1000))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Token::new(crate::Tag::Read, 0))
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Token::new(crate::Tag::Write, 5))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
