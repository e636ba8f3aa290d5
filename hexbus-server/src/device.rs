//! # Register File
//!
//! A sparse in-memory [Device]. Registers that were never written read as zero.
//!
//! Two behaviors can be configured to emulate real peripherals:
//!
//! - *fault addresses*, at which every access fails with a bus error
//! - an *interrupt register*, whose writes are stored and also raise an interrupt
use std::collections::{HashMap, HashSet};

use hexbus_protocol::{BusFault, Word};

use crate::Device;

#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    registers: HashMap<Word, Word>,
    faults: HashSet<Word>,
    interrupt_register: Option<Word>,
    interrupt_pending: bool,
}

impl RegisterFile {
    pub fn new() -> RegisterFile {
        RegisterFile::default()
    }

    /// Any access to `address` fails with a bus error.
    pub fn with_fault(mut self, address: Word) -> Self {
        self.faults.insert(address);
        self
    }

    /// A write to `address` raises an interrupt.
    pub fn with_interrupt_register(mut self, address: Word) -> Self {
        self.interrupt_register = Some(address);
        self
    }

    /// Inspect a register without going through the bus
    pub fn get(&self, address: Word) -> Word {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Set a register without going through the bus
    pub fn set(&mut self, address: Word, value: Word) {
        self.registers.insert(address, value);
    }

    pub fn raise_interrupt(&mut self) {
        self.interrupt_pending = true;
    }

    fn check(&self, address: Word) -> Result<(), BusFault> {
        if self.faults.contains(&address) {
            Err(BusFault::remote(address))
        } else {
            Ok(())
        }
    }
}

impl Device for RegisterFile {
    fn read(&mut self, address: Word) -> Result<Word, BusFault> {
        self.check(address)?;
        Ok(self.get(address))
    }

    fn write(&mut self, address: Word, value: Word) -> Result<(), BusFault> {
        self.check(address)?;
        self.set(address, value);
        if self.interrupt_register == Some(address) {
            self.interrupt_pending = true;
        }
        Ok(())
    }

    fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.interrupt_pending)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unwritten_registers_read_zero() {
        let mut regs = RegisterFile::new();
        assert_eq!(regs.read(0x40).unwrap(), 0);
        regs.write(0x40, 7).unwrap();
        assert_eq!(regs.read(0x40).unwrap(), 7);
    }

    #[test]
    fn faults_apply_to_reads_and_writes() {
        let mut regs = RegisterFile::new().with_fault(0x10);
        assert_eq!(regs.read(0x10), Err(BusFault::remote(0x10)));
        assert_eq!(regs.write(0x10, 1), Err(BusFault::remote(0x10)));
        assert_eq!(regs.get(0x10), 0);
    }

    #[test]
    fn interrupt_register() {
        let mut regs = RegisterFile::new().with_interrupt_register(0x80);
        regs.write(0x7c, 1).unwrap();
        assert!(!regs.take_interrupt());
        regs.write(0x80, 1).unwrap();
        assert!(regs.take_interrupt());
        assert!(!regs.take_interrupt());
    }
}
