//! Scripted device end of the link for exercising the engine without I/O.
use std::{collections::VecDeque, io, time::Duration};

use bytes::BytesMut;
use hexbus_protocol::{Tag, Token, codec::Lexer};
use hexbus_server::{device::RegisterFile, responder::Responder};

use crate::transport::Transport;

const MAX_READ: usize = 3;

pub(crate) struct SimRemote {
    lexer: Lexer,
    responder: Responder<RegisterFile>,
    rx: VecDeque<u8>,
    held: Vec<u8>,
    held_acks: usize,
    outstanding: usize,
    max_outstanding: usize,
    delay_acks: bool,
    read_reply: Option<Vec<u8>>,
    filler_every: Option<usize>,
    delivered: usize,
    wire: Vec<u8>,
    closed: bool,
}

impl SimRemote {
    pub(crate) fn new(device: RegisterFile) -> SimRemote {
        SimRemote {
            lexer: Lexer::new(),
            responder: Responder::new(device),
            rx: VecDeque::new(),
            held: Vec::new(),
            held_acks: 0,
            outstanding: 0,
            max_outstanding: 0,
            delay_acks: false,
            read_reply: None,
            filler_every: None,
            delivered: 0,
            wire: Vec::new(),
            closed: false,
        }
    }

    /// Hold write acknowledgements back until the host waits for them.
    pub(crate) fn delay_acks(mut self) -> Self {
        self.delay_acks = true;
        self
    }

    /// Answer every read request with `reply` instead of consulting the device.
    pub(crate) fn with_read_reply(mut self, reply: &[u8]) -> Self {
        self.read_reply = Some(reply.to_vec());
        self
    }

    /// Insert an idle filler byte before every `k`-th byte sent to the host.
    pub(crate) fn with_filler_every(mut self, k: usize) -> Self {
        self.filler_every = Some(k.max(1));
        self
    }

    /// Everything the host has transmitted.
    pub(crate) fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub(crate) fn count_on_wire(&self, tag: Tag) -> usize {
        self.wire.iter().filter(|b| **b == tag.as_byte()).count()
    }

    /// Peak number of writes received but not yet acknowledged to the host.
    pub(crate) fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    pub(crate) fn device(&self) -> &RegisterFile {
        self.responder.device()
    }

    pub(crate) fn device_mut(&mut self) -> &mut RegisterFile {
        self.responder.device_mut()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send unsolicited bytes to the host.
    pub(crate) fn push_raw(&mut self, bytes: &[u8]) {
        self.deliver(bytes);
    }

    fn respond(&mut self, token: Token) {
        let mut out = BytesMut::new();
        match (token.tag, self.read_reply.as_ref()) {
            (Tag::Read, Some(reply)) => out.extend_from_slice(reply),
            _ => self.responder.handle(token, &mut out),
        }
        if token.tag == Tag::Write {
            self.outstanding += 1;
            self.max_outstanding = self.max_outstanding.max(self.outstanding);
            if self.delay_acks {
                self.held.extend_from_slice(&out);
                self.held_acks += 1;
                return;
            }
            self.outstanding -= 1;
        }
        self.deliver(&out);
    }

    fn release(&mut self) {
        let held = std::mem::take(&mut self.held);
        self.deliver(&held);
        self.outstanding -= self.held_acks;
        self.held_acks = 0;
    }

    fn deliver(&mut self, bytes: &[u8]) {
        for byte in bytes {
            if let Some(k) = self.filler_every {
                if self.delivered % k == 0 {
                    self.rx
                        .push_back(if self.delivered % 2 == 0 { 0x7f } else { 0xff });
                }
            }
            self.rx.push_back(*byte);
            self.delivered += 1;
        }
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(io::ErrorKind::NotConnected, "closed"))
        } else {
            Ok(())
        }
    }
}

impl Transport for SimRemote {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_open()?;
        self.wire.extend_from_slice(buf);
        for byte in buf {
            if let Some(token) = self.lexer.push(*byte) {
                self.respond(token);
            }
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        if self.rx.is_empty() {
            self.release();
        }
        let n = buf.len().min(self.rx.len()).min(MAX_READ);
        for slot in &mut buf[..n] {
            if let Some(byte) = self.rx.pop_front() {
                *slot = byte;
            }
        }
        Ok(n)
    }

    fn available(&mut self) -> io::Result<bool> {
        self.check_open()?;
        Ok(!self.rx.is_empty())
    }

    fn wait(&mut self, _timeout: Duration) -> io::Result<bool> {
        self.check_open()?;
        self.release();
        Ok(!self.rx.is_empty())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
