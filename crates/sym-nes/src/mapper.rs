//! Cartridge mappers.
//!
//! A mapper owns the banking policy of a cartridge board: which ROM pages
//! the PRG banks of the CPU address space see. Mappers are shared
//! read-only across forked contexts; all mutable banking state lives in the
//! context's bank table.

use std::rc::Rc;

use log::debug;

use crate::context::Context;
use crate::error::{Error, Result};

/// Cartridge banking policy.
///
/// `load` runs once after the ROM image is attached, `reset` maps the
/// power-on bank configuration. The cycle hooks exist for boards with
/// counters; the boards implemented here ignore them.
pub trait Mapper {
    /// One-time setup after the ROM image is attached.
    ///
    /// # Errors
    ///
    /// Mapper-specific; NROM never fails.
    fn load(&self, ctx: &mut Context) -> Result<()>;

    /// Map the power-on bank configuration.
    fn reset(&self, ctx: &mut Context);

    /// Teardown hook.
    fn unload(&self, _ctx: &mut Context) {}

    /// Per-CPU-cycle hook.
    fn cpu_cycle(&self, _ctx: &mut Context) {}

    /// Per-PPU-cycle hook.
    fn ppu_cycle(&self, _ctx: &mut Context) {}
}

/// Create a mapper by iNES id.
///
/// # Errors
///
/// `UnknownMapper` if the id has no implementation.
pub fn mapper_for_id(mapper_id: u8, ines_flags: u8) -> Result<Rc<dyn Mapper>> {
    match mapper_id {
        0 => Ok(Rc::new(Nrom::new(ines_flags))),
        other => Err(Error::UnknownMapper(other)),
    }
}

impl Context {
    /// Point one 4K PRG bank at a ROM page (masked to the image size) and
    /// mark it readable.
    pub fn set_prg_rom_4(&mut self, bank: usize, value: usize) {
        let mask = self.rom().map_or(0, |rom| rom.prg_mask());
        let entry = &mut self.banks[bank];
        entry.prg_page = Some(value & mask);
        entry.readable = true;
        entry.writable = false;
    }

    /// Map an 8K window as two consecutive 4K pages.
    pub fn set_prg_rom_8(&mut self, bank: usize, value: usize) {
        let value = value << 1;
        for k in 0..2 {
            self.set_prg_rom_4(bank + k, value + k);
        }
    }

    /// Map a 16K window as four consecutive 4K pages.
    pub fn set_prg_rom_16(&mut self, bank: usize, value: usize) {
        let value = value << 2;
        for k in 0..4 {
            self.set_prg_rom_4(bank + k, value + k);
        }
    }

    /// Map a 32K window as eight consecutive 4K pages.
    pub fn set_prg_rom_32(&mut self, bank: usize, value: usize) {
        let value = value << 3;
        for k in 0..8 {
            self.set_prg_rom_4(bank + k, value + k);
        }
    }
}

/// NROM (mapper 0): no bank switching. 32K (or mirrored 16K) of PRG at
/// $8000-$FFFF.
pub struct Nrom {
    ines_flags: u8,
}

impl Nrom {
    #[must_use]
    pub fn new(ines_flags: u8) -> Self {
        Self { ines_flags }
    }
}

impl Mapper for Nrom {
    fn load(&self, _ctx: &mut Context) -> Result<()> {
        // PRG RAM (flag 0x02) and CHR mapping are stubs.
        debug!("NROM load, ines flags {:#04x}", self.ines_flags);
        Ok(())
    }

    fn reset(&self, ctx: &mut Context) {
        ctx.set_prg_rom_32(0x8, 0);
    }
}
