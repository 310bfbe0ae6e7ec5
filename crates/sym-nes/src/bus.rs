//! Banked address bus.
//!
//! The 64K CPU address space splits into sixteen 4K banks indexed by the
//! high nibble of the address. Each bank routes to one of a closed set of
//! devices; PRG banks additionally carry readable/writable flags and a ROM
//! page index installed by the mapper.
//!
//! - Banks $0-$1: internal RAM (`addr & $7FF`)
//! - Banks $2-$3: PPU registers (stubs)
//! - Bank  $4:    APU and controller registers
//! - Banks $5-$F: cartridge PRG space

use log::trace;
use sym_ast::{AstManager, TermId};

use crate::context::Context;
use crate::error::Result;

/// Device handling a 4K bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BankDevice {
    Ram,
    Ppu,
    Apu,
    Prg,
}

/// Per-bank routing entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Bank {
    pub device: BankDevice,
    pub readable: bool,
    pub writable: bool,
    /// Index into the ROM image's 4K PRG pages, once mapped.
    pub prg_page: Option<usize>,
}

impl Bank {
    const fn device(device: BankDevice) -> Self {
        Self {
            device,
            readable: false,
            writable: false,
            prg_page: None,
        }
    }

    /// Power-on bank map: RAM, PPU, APU, then unmapped PRG.
    pub(crate) fn default_map() -> [Bank; 16] {
        let mut banks = [Bank::device(BankDevice::Prg); 16];
        banks[0x0] = Bank::device(BankDevice::Ram);
        banks[0x1] = Bank::device(BankDevice::Ram);
        banks[0x2] = Bank::device(BankDevice::Ppu);
        banks[0x3] = Bank::device(BankDevice::Ppu);
        banks[0x4] = Bank::device(BankDevice::Apu);
        banks
    }
}

/// Controller shift-register read at $4016.
const APU_CONTROLLER1: u16 = 0x016;
/// Controller 2 / frame counter at $4017.
const APU_CONTROLLER2: u16 = 0x017;

impl Context {
    /// Bank read dispatch. `None` means no device drove the bus.
    pub(crate) fn bus_read(
        &mut self,
        m: &mut AstManager,
        bank: usize,
        offset: u16,
    ) -> Result<Option<TermId>> {
        match self.banks[bank].device {
            BankDevice::Ram => Ok(Some(self.read_ram(offset))),
            BankDevice::Ppu => Ok(None),
            BankDevice::Apu => match offset {
                APU_CONTROLLER1 => {
                    let serial = self.controller1_read(m)?;
                    Ok(Some(self.controller_open_bus(m, serial)?))
                }
                APU_CONTROLLER2 => {
                    let serial = self.controller2_read(m);
                    Ok(Some(self.controller_open_bus(m, serial)?))
                }
                _ => Ok(None),
            },
            BankDevice::Prg => {
                let entry = self.banks[bank];
                if !entry.readable {
                    return Ok(Some(m.byte(0xFF)));
                }
                match (entry.prg_page, self.rom.as_ref()) {
                    (Some(page), Some(rom)) => Ok(Some(rom.prg_byte(page, offset))),
                    _ => Ok(Some(m.byte(0xFF))),
                }
            }
        }
    }

    /// Bank write dispatch.
    pub(crate) fn bus_write(
        &mut self,
        m: &mut AstManager,
        bank: usize,
        offset: u16,
        data: TermId,
    ) -> Result<()> {
        match self.banks[bank].device {
            BankDevice::Ram => {
                self.write_ram(offset, data);
                Ok(())
            }
            BankDevice::Ppu => Ok(()),
            BankDevice::Apu => match offset {
                APU_CONTROLLER1 => self.controller_write(m, data),
                // $4017 is the APU frame counter; not modelled.
                _ => Ok(()),
            },
            BankDevice::Prg => {
                if self.banks[bank].writable {
                    // PRG RAM stub: nothing backs writable banks yet.
                    trace!("PRG write to bank {bank:#X} dropped");
                }
                Ok(())
            }
        }
    }

    /// Compose a controller serial bit with the open-bus bits of the last
    /// read: `(last_read & $C0) | (serial & $19)`.
    fn controller_open_bus(&mut self, m: &mut AstManager, serial: TermId) -> Result<TermId> {
        let bus_mask = m.byte(0xC0);
        let bus_bits = m.bv_and(self.last_read, bus_mask)?;
        let serial_mask = m.byte(0x19);
        let serial_bits = m.bv_and(serial, serial_mask)?;
        Ok(m.bv_or(bus_bits, serial_bits)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_routes_devices() {
        let banks = Bank::default_map();
        assert_eq!(banks[0x0].device, BankDevice::Ram);
        assert_eq!(banks[0x1].device, BankDevice::Ram);
        assert_eq!(banks[0x2].device, BankDevice::Ppu);
        assert_eq!(banks[0x3].device, BankDevice::Ppu);
        assert_eq!(banks[0x4].device, BankDevice::Apu);
        for bank in &banks[0x5..] {
            assert_eq!(bank.device, BankDevice::Prg);
            assert!(!bank.readable);
            assert!(!bank.writable);
        }
    }

    #[test]
    fn ram_banks_mirror_the_2k_window() {
        let mut m = AstManager::new();
        let mut ctx = Context::new(&mut m);
        let v = m.byte(0xAB);
        ctx.write_ram(0x0000, v);
        // Bank 1 offset $800 lands on the same cell through the mask.
        let got = ctx.bus_read(&mut m, 1, 0x0800).unwrap().unwrap();
        assert_eq!(m.value(got), Some(0xAB));
    }

    #[test]
    fn unmapped_prg_reads_all_ones() {
        let mut m = AstManager::new();
        let mut ctx = Context::new(&mut m);
        let got = ctx.bus_read(&mut m, 0x8, 0x0123).unwrap().unwrap();
        assert_eq!(m.value(got), Some(0xFF));
    }

    #[test]
    fn ppu_reads_float_the_bus() {
        let mut m = AstManager::new();
        let mut ctx = Context::new(&mut m);
        assert!(ctx.bus_read(&mut m, 0x2, 0x0002).unwrap().is_none());
    }
}
