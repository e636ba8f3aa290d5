use bytes::BytesMut;
use hexbus_protocol::{Response, Tag, Token, Word};

use crate::Device;

/// Device-side protocol state machine.
///
/// Consumes host tokens and appends the device's replies to an output buffer.
#[derive(Debug)]
pub struct Responder<D: Device> {
    device: D,
    address: Word,
    increment: bool,
}

impl<D: Device> Responder<D> {
    pub fn new(device: D) -> Responder<D> {
        Responder {
            device,
            address: 0,
            increment: true,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Forgets the address state, as a freshly reset bus would.
    pub fn reset(&mut self) {
        self.address = 0;
        self.increment = true;
    }

    /// Process a single host token.
    pub fn handle(&mut self, token: Token, out: &mut BytesMut) {
        match token.tag {
            Tag::Address => {
                self.address = token.value & !3;
                self.increment = token.value & 1 == 0;
                log::debug!(
                    "Address set to {:08x}{}",
                    self.address,
                    if self.increment { " (inc)" } else { "" }
                );
                Response::Address(token.value).encode(out);
            }
            Tag::Read => match self.device.read(self.address) {
                Ok(value) => {
                    log::debug!("Read [{:08x}] = {:08x}", self.address, value);
                    Response::ReadData(value).encode(out);
                    self.advance();
                }
                Err(fault) => {
                    log::debug!("Read failed: {}", fault);
                    Response::Error.encode(out);
                }
            },
            Tag::Write => match self.device.write(self.address, token.value) {
                Ok(()) => {
                    log::debug!("Write [{:08x}] = {:08x}", self.address, token.value);
                    Response::Ack.encode(out);
                    self.advance();
                }
                Err(fault) => {
                    log::debug!("Write failed: {}", fault);
                    Response::Error.encode(out);
                }
            },
            other => log::debug!("Ignoring host token {}", other),
        }
        self.report_interrupt(out);
    }

    /// Emit an idle token, plus any interrupt raised meanwhile.
    pub fn idle(&mut self, out: &mut BytesMut) {
        Response::Idle.encode(out);
        self.report_interrupt(out);
    }

    fn report_interrupt(&mut self, out: &mut BytesMut) {
        if self.device.take_interrupt() {
            log::debug!("Reporting interrupt");
            Response::Interrupt.encode(out);
        }
    }

    fn advance(&mut self) {
        if self.increment {
            self.address = self.address.wrapping_add(4);
        }
    }
}
