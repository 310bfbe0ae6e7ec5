//! Controller port: a serial shift register over symbolic button state.
//!
//! Writing bit 0 = 1 to $4016 puts the port in strobe mode; while strobed,
//! the "current buttons" are a fresh unknown, so each write and each read
//! mints a new 8-bit input variable. Writing bit 0 = 0 latches the current
//! variable; the next eight reads shift its bits out one at a time, and
//! further reads return the idle line value 1. Every minted variable is
//! recorded on the context — those are the knobs the solver turns.

use sym_ast::{AstManager, TermId};

use crate::context::Context;
use crate::error::{Error, Result};

/// Controller shift-register state.
#[derive(Debug, Clone)]
pub(crate) struct Controller {
    /// 1-based port number, used in minted variable names.
    index: u8,
    /// Current button state, usually a fresh symbolic variable per strobe.
    pub(crate) bits: TermId,
    /// Next bit to shift out (0..8; 8 = exhausted).
    pub(crate) bit_ptr: u8,
    /// Strobe latch: while true the register continuously reloads.
    pub(crate) strobe: bool,
    /// Counter behind minted variable names.
    pub(crate) seqno: u32,
}

impl Controller {
    pub(crate) fn new(index: u8, bits: TermId) -> Self {
        Self {
            index,
            bits,
            bit_ptr: 0,
            strobe: false,
            seqno: 0,
        }
    }
}

impl Context {
    /// Handle a write to $4016.
    ///
    /// The strobe value must be concrete. A written 1 mints a fresh input
    /// variable (the register is live-reloading from unknown buttons); the
    /// falling edge latches the current variable and rewinds the shift
    /// pointer.
    pub(crate) fn controller_write(&mut self, m: &mut AstManager, value: TermId) -> Result<()> {
        let v = m.value(value).ok_or(Error::SymbolicStrobe)?;
        let new_strobe = v & 1 != 0;

        if new_strobe {
            self.mint_controller_bits(m)?;
        } else if self.controller1.strobe {
            // Falling edge: latch, rewind.
            self.controller1.bit_ptr = 0;
        }
        self.controller1.strobe = new_strobe;
        Ok(())
    }

    /// Serial read from controller 1 ($4016).
    pub(crate) fn controller1_read(&mut self, m: &mut AstManager) -> Result<TermId> {
        if self.controller1.strobe {
            // Live reload: every read sees fresh unknown buttons.
            self.mint_controller_bits(m)?;
            let one = m.byte(1);
            return Ok(m.bv_and(self.controller1.bits, one)?);
        }

        if self.controller1.bit_ptr < 8 {
            let ptr = self.controller1.bit_ptr;
            let bit_mask = m.byte(1 << ptr);
            let masked = m.bv_and(self.controller1.bits, bit_mask)?;
            let shift = m.byte(ptr);
            let bit = m.bv_lshr(masked, shift)?;
            self.controller1.bit_ptr += 1;
            Ok(bit)
        } else {
            // Shift register exhausted: the line reads 1.
            Ok(m.byte(1))
        }
    }

    /// Serial read from controller 2 ($4017). No second controller is
    /// populated; the line idles at 1.
    pub(crate) fn controller2_read(&mut self, m: &mut AstManager) -> TermId {
        m.byte(1)
    }

    /// Mint a fresh 8-bit input variable for the controller and record it.
    fn mint_controller_bits(&mut self, m: &mut AstManager) -> Result<()> {
        let name = format!(
            "controller{}_frame{}_seq{}",
            self.controller1.index, self.frame_number, self.controller1.seqno
        );
        self.controller1.seqno += 1;
        let var = m.var(&name, 8)?;
        self.controller1.bits = var;
        self.controller1.bit_ptr = 0;
        self.inputs.push(var);
        Ok(())
    }
}
