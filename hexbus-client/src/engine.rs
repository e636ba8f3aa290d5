use std::{
    io,
    time::{Duration, Instant},
};

use bytes::{Buf, BytesMut};
use hexbus_protocol::{BusFault, Command, FaultCause, Tag, Token, Word, codec::Lexer};

use crate::{config::Config, error::BusError, transport::Transport};

const RX_CHUNK: usize = 64;

/// What the host believes about the device end of the link.
#[derive(Clone, Debug, Default)]
pub(crate) struct LinkState {
    /// Last address addressed to, or acknowledged by, the device.
    pub(crate) last_address: Word,
    /// False until an address is set, and again after a bus reset.
    pub(crate) address_known: bool,
    pub(crate) auto_increment: bool,
    /// Acknowledgements received during the current write vector.
    pub(crate) acks: usize,
    pub(crate) interrupt: bool,
    pub(crate) bus_error: bool,
}

/// How a completed token is treated depends on what the caller is waiting for.
enum Mode {
    /// A read request is outstanding. Idle tokens count down towards abandoning it.
    Read { countdown: u32 },
    /// Consuming whatever is buffered. Bus errors fail the current operation.
    Drain,
    /// Waiting for an interrupt. Bus errors are only latched.
    Listen,
}

enum Outcome {
    Continue,
    Datum(Word),
    Fault(BusFault),
}

/// The hexbus protocol engine.
///
/// Owns the transport and the host's view of the link, encodes operations onto
/// the wire and decodes the device's replies synchronously, inside the call
/// that needs them.
pub(crate) struct Engine<T: Transport> {
    transport: T,
    config: Config,
    pub(crate) state: LinkState,
    lexer: Lexer,
    tx: BytesMut,
    rx: BytesMut,
    total_read: u64,
    broken: bool,
    drain_logged: bool,
}

impl<T: Transport> Engine<T> {
    pub(crate) fn new(transport: T, config: Config) -> Engine<T> {
        Engine {
            transport,
            config,
            state: LinkState::default(),
            lexer: Lexer::new(),
            tx: BytesMut::with_capacity(64),
            rx: BytesMut::with_capacity(RX_CHUNK),
            total_read: 0,
            broken: false,
            drain_logged: false,
        }
    }

    pub(crate) fn total_read(&self) -> u64 {
        self.total_read
    }

    pub(crate) fn is_usable(&self) -> bool {
        !self.broken
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn check_usable(&self, address: Word) -> Result<(), BusError> {
        if self.broken {
            return Err(BusError::ConnectionLost);
        }
        if address & 3 != 0 {
            return Err(BusError::Unaligned { address });
        }
        Ok(())
    }

    /// Marks the connection dead on fatal errors and closes the transport.
    fn fail(&mut self, err: BusError) -> BusError {
        if err.is_fatal() && !self.broken {
            log::error!("Closing connection: {}", err);
            self.broken = true;
            if let Err(close_err) = self.transport.close() {
                log::debug!("Error while closing transport: {}", close_err);
            }
        }
        err
    }

    pub(crate) fn close(&mut self) -> io::Result<()> {
        self.broken = true;
        self.transport.close()
    }

    /// Queue an address command unless the device is known to be there already.
    fn encode_address(&mut self, address: Word, increment: bool) {
        let state = &mut self.state;
        if state.address_known && state.last_address == address && state.auto_increment == increment
        {
            log::debug!("Address is already set to {:08x}", address);
        } else {
            Command::SetAddress { address, increment }.encode(&mut self.tx);
        }
        state.last_address = address;
        state.address_known = true;
        state.auto_increment = increment;
    }

    fn transmit(&mut self) -> Result<(), BusError> {
        log::trace!(">> {:?}", String::from_utf8_lossy(&self.tx));
        let mut sent = 0;
        while sent < self.tx.len() {
            match self.transport.write(&self.tx[sent..]) {
                Ok(0) => return Err(self.fail(BusError::Closed)),
                Ok(n) => sent += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(self.fail(err.into())),
            }
        }
        self.tx.clear();
        Ok(())
    }

    /// Read the next chunk from the transport into the receive buffer. Blocks.
    fn fill(&mut self) -> Result<(), BusError> {
        let mut chunk = [0u8; RX_CHUNK];
        match self.transport.read(&mut chunk) {
            Ok(0) => Err(self.fail(BusError::Closed)),
            Ok(n) => {
                self.total_read += n as u64;
                self.rx.extend_from_slice(&chunk[..n]);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                let poll = self.config.poll_interval;
                self.wait_readable(poll).map(|_| ())
            }
            Err(err) => Err(self.fail(err.into())),
        }
    }

    fn next_byte(&mut self) -> Result<u8, BusError> {
        while self.rx.is_empty() {
            self.fill()?;
        }
        Ok(self.rx.get_u8())
    }

    fn available(&mut self) -> Result<bool, BusError> {
        if !self.rx.is_empty() {
            return Ok(true);
        }
        match self.transport.available() {
            Ok(available) => Ok(available),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool, BusError> {
        if !self.rx.is_empty() {
            return Ok(true);
        }
        match self.transport.wait(timeout) {
            Ok(ready) => Ok(ready),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(false),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// Apply a completed token to the link state.
    fn dispatch(&mut self, token: Token, mode: &mut Mode) -> Outcome {
        log::trace!("<< {}{:x}", token.tag, token.value);
        let state = &mut self.state;
        match token.tag {
            Tag::Address => {
                state.last_address = token.value & !3;
                state.auto_increment = token.value & 1 == 0;
                state.address_known = true;
                log::trace!(
                    "Device at address {:08x}{}",
                    state.last_address,
                    if state.auto_increment { " (inc)" } else { "" }
                );
            }
            Tag::Read => {
                if state.auto_increment {
                    state.last_address = state.last_address.wrapping_add(4);
                }
                if let Mode::Read { .. } = mode {
                    return Outcome::Datum(token.value);
                }
                log::debug!("Discarding unrequested read datum {:08x}", token.value);
            }
            Tag::Ack => {
                if state.auto_increment {
                    state.last_address = state.last_address.wrapping_add(4);
                }
                state.acks += 1;
            }
            Tag::Interrupt => state.interrupt = true,
            Tag::Error => {
                state.bus_error = true;
                if let Mode::Listen = mode {
                    log::warn!("Bus error at {:08x}", state.last_address);
                } else {
                    log::debug!("Bus error at {:08x}", state.last_address);
                    return Outcome::Fault(BusFault::remote(state.last_address));
                }
            }
            Tag::Reset => {
                log::warn!("Bus was reset");
                state.address_known = false;
                state.bus_error = false;
            }
            Tag::Idle => {
                if let Mode::Read { countdown } = mode {
                    *countdown = countdown.saturating_sub(1);
                    if *countdown == 0 {
                        log::debug!("Device idle while a read is pending, aborting");
                        return Outcome::Fault(BusFault::unresponsive());
                    }
                }
            }
            other => log::debug!("Ignoring out-of-band token {}", other),
        }
        Outcome::Continue
    }

    /// Block until the datum answering the outstanding read request arrives.
    fn read_datum(&mut self) -> Result<Word, BusError> {
        let mut mode = Mode::Read {
            countdown: self.config.idle_abort_threshold.max(1),
        };
        loop {
            let byte = self.next_byte()?;
            let Some(token) = self.lexer.push(byte) else {
                continue;
            };
            match self.dispatch(token, &mut mode) {
                Outcome::Datum(word) => return Ok(word),
                Outcome::Fault(fault) => return Err(fault.into()),
                Outcome::Continue => {}
            }
        }
    }

    fn drain(&mut self, mut mode: Mode) -> Result<(), BusError> {
        while self.available()? {
            let byte = self.next_byte()?;
            if let Some(token) = self.lexer.push(byte) {
                if let Outcome::Fault(fault) = self.dispatch(token, &mut mode) {
                    return Err(fault.into());
                }
            }
        }
        Ok(())
    }

    /// Process everything that has already arrived, without blocking.
    pub(crate) fn drain_idle(&mut self) -> Result<(), BusError> {
        if !self.drain_logged {
            log::trace!("Draining idle input");
            self.drain_logged = true;
        }
        self.drain(Mode::Drain)
    }

    /// Block until `target` acknowledgements have been counted.
    fn await_acks(&mut self, target: usize) -> Result<(), BusError> {
        while self.state.acks < target {
            let poll = self.config.poll_interval;
            if self.wait_readable(poll)? {
                self.drain_idle()?;
            }
        }
        Ok(())
    }

    /// Replace the address of a device fault with the address actually reached.
    fn annotate(err: BusError, address: Word, done: usize, increment: bool) -> BusError {
        match err {
            BusError::Fault(BusFault {
                cause: FaultCause::Remote,
                ..
            }) => BusError::Fault(BusFault::remote(word_address(address, done, increment))),
            other => other,
        }
    }

    /// After a transfer the device must be exactly where the host expects it.
    fn verify_address(&mut self, address: Word, count: usize, increment: bool) -> Result<(), BusError> {
        let expected = word_address(address, count, increment);
        let actual = self.state.last_address;
        if actual == expected {
            return Ok(());
        }
        log::error!(
            "Address mismatch after transfer of {} words at {:08x}{}: device at {:08x}, expected {:08x}",
            count,
            address,
            if increment { " (inc)" } else { "" },
            actual,
            expected
        );
        self.state.address_known = false;
        let err = self.fail(BusError::Desync { expected, actual });
        if self.config.abort_on_desync {
            std::process::exit(1);
        }
        Err(err)
    }

    pub(crate) fn read_vector(
        &mut self,
        address: Word,
        count: usize,
        increment: bool,
    ) -> Result<Vec<Word>, BusError> {
        self.check_usable(address)?;
        let mut words = Vec::with_capacity(count);
        if count == 0 {
            return Ok(words);
        }
        log::debug!(
            "READV({:08x}, {}, #{})",
            address,
            if increment { "inc" } else { "fixed" },
            count
        );
        self.drain_logged = false;

        // A reset that arrived since the last operation invalidates the cached address
        self.drain(Mode::Listen)?;
        self.tx.clear();
        self.encode_address(address, increment);
        while words.len() < count {
            Command::Read.encode(&mut self.tx);
            self.transmit()?;
            match self.read_datum() {
                Ok(word) => words.push(word),
                Err(err) => return Err(Self::annotate(err, address, words.len(), increment)),
            }
        }

        self.verify_address(address, count, increment)?;
        Ok(words)
    }

    pub(crate) fn read_word(&mut self, address: Word) -> Result<Word, BusError> {
        let words = self.read_vector(address, 1, false)?;
        Ok(words[0])
    }

    pub(crate) fn write_vector(
        &mut self,
        address: Word,
        words: &[Word],
        increment: bool,
    ) -> Result<(), BusError> {
        self.check_usable(address)?;
        if words.is_empty() {
            return Ok(());
        }
        log::debug!(
            "WRITEV({:08x}, {}, #{}, {:08x} ...)",
            address,
            if increment { "inc" } else { "fixed" },
            words.len(),
            words[0]
        );
        self.drain_logged = false;

        // Anything still buffered belongs to earlier operations
        self.drain(Mode::Listen)?;
        self.tx.clear();
        self.encode_address(address, increment);
        self.state.acks = 0;
        let window = self.config.write_window.max(1);

        for (index, word) in words.iter().enumerate() {
            // Word `index` may only go out once at most `window - 1` writes are unacknowledged
            self.await_acks((index + 1).saturating_sub(window))
                .map_err(|err| Self::annotate(err, address, self.state.acks, increment))?;
            Command::Write(*word).encode(&mut self.tx);
            self.transmit()?;
            self.drain_idle()
                .map_err(|err| Self::annotate(err, address, self.state.acks, increment))?;
        }

        log::trace!("Missing {} acks", words.len().saturating_sub(self.state.acks));
        self.await_acks(words.len())
            .map_err(|err| Self::annotate(err, address, self.state.acks, increment))?;
        self.verify_address(address, words.len(), increment)
    }

    /// Wait for the device to raise an interrupt, forever when `timeout` is `None`.
    /// Returns whether the interrupt flag is set.
    pub(crate) fn wait_for_interrupt(&mut self, timeout: Option<Duration>) -> Result<bool, BusError> {
        if self.broken {
            return Err(BusError::ConnectionLost);
        }
        if self.state.interrupt {
            log::debug!("Interrupted prior to wait");
        }
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            self.drain(Mode::Listen)?;
            if self.state.interrupt {
                return Ok(true);
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    (deadline - now).min(self.config.poll_interval)
                }
                None => self.config.poll_interval,
            };
            self.wait_readable(slice)?;
        }
    }
}

impl<T: Transport> Drop for Engine<T> {
    fn drop(&mut self) {
        if let Err(err) = self.transport.close() {
            log::debug!("Error while closing transport: {}", err);
        }
    }
}

fn word_address(address: Word, count: usize, increment: bool) -> Word {
    if increment {
        address.wrapping_add((count as Word).wrapping_mul(4))
    } else {
        address
    }
}
