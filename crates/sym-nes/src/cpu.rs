//! The 6502 micro-state machine over symbolic terms.
//!
//! Each host step is one CPU cycle. Phase 1 (memory completion) lives in
//! `context.rs`; this file is phase 2: the state machine advance, which
//! performs register updates and arms the bus access of the next cycle.
//!
//! The reset sequence is
//! ```text
//! MemGetCode(PC)
//! MemGet(0x100 | SP)
//! SP -= 1; MemGet(0x100 | SP)
//! SP -= 1; MemGet(0x100 | SP)
//! SP -= 1; FI = 1; MemGet(0xFFFC)
//! PC[7:0]  = data; MemGet(0xFFFD)
//! PC[15:8] = data; MemGetCode(PC)
//! ```
//! after which the CPU enters the decode / addressing / execute loop.

use log::trace;
use sym_ast::{AstManager, TermId};

use crate::context::{Context, CpuState, StepOutcome};
use crate::decode::{decode_opcode, AddressingMode, Family};
use crate::error::{Error, Result};

impl Context {
    /// Phase 2 dispatch on the CPU state.
    pub(crate) fn step_cpu(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        match self.cpu_state {
            CpuState::Reset1
            | CpuState::Reset2
            | CpuState::Reset3
            | CpuState::Reset4
            | CpuState::Reset5
            | CpuState::Reset6
            | CpuState::Reset7 => {
                self.cpu_reset(m)?;
                Ok(StepOutcome::Continue)
            }
            CpuState::Decode => self.cpu_decode(m),
            CpuState::AddressingMode => self.addressing_tick(m),
            CpuState::Execute => self.execute_tick(m),
        }
    }

    /// Arm the next opcode fetch and return to decode.
    pub(crate) fn instruction_fetch(&mut self) {
        self.cpu_read(self.pc);
        self.cpu_state = CpuState::Decode;
    }

    /// `PC := PC + 1`.
    fn increment_pc(&mut self, m: &mut AstManager) -> Result<()> {
        let one = m.halfword(1);
        self.pc = m.bv_add(self.pc, one)?;
        Ok(())
    }

    /// `0x0100 | (0x00 ∥ SP)` — the stack page address of the current SP.
    fn stack_address(&mut self, m: &mut AstManager) -> Result<TermId> {
        let page = m.halfword(0x0100);
        let zero = m.byte(0);
        let sp16 = m.bv_concat(zero, self.sp)?;
        Ok(m.bv_or(page, sp16)?)
    }

    /// One reset micro-step.
    fn cpu_reset(&mut self, m: &mut AstManager) -> Result<()> {
        match self.cpu_state {
            CpuState::Reset1 => {
                self.cpu_read(self.pc);
                self.cpu_state = CpuState::Reset2;
            }
            CpuState::Reset2 => {
                let addr = self.stack_address(m)?;
                self.cpu_read(addr);
                self.cpu_state = CpuState::Reset3;
            }
            CpuState::Reset3 => {
                let one = m.byte(1);
                self.sp = m.bv_sub(self.sp, one)?;
                let addr = self.stack_address(m)?;
                self.cpu_read(addr);
                self.cpu_state = CpuState::Reset4;
            }
            CpuState::Reset4 => {
                let one = m.byte(1);
                self.sp = m.bv_sub(self.sp, one)?;
                let addr = self.stack_address(m)?;
                self.cpu_read(addr);
                self.cpu_state = CpuState::Reset5;
            }
            CpuState::Reset5 => {
                let one = m.byte(1);
                self.sp = m.bv_sub(self.sp, one)?;
                self.flag_i = m.bool_const(true);
                let vector = m.halfword(0xFFFC);
                self.cpu_read(vector);
                self.cpu_state = CpuState::Reset6;
            }
            CpuState::Reset6 => {
                let high = m.bv_extract(self.pc, 15, 8)?;
                self.pc = m.bv_concat(high, self.last_read)?;
                let vector = m.halfword(0xFFFD);
                self.cpu_read(vector);
                self.cpu_state = CpuState::Reset7;
            }
            CpuState::Reset7 => {
                let low = m.bv_extract(self.pc, 7, 0)?;
                self.pc = m.bv_concat(self.last_read, low)?;
                self.instruction_fetch();
            }
            _ => unreachable!("cpu_reset entered outside the reset sequence"),
        }
        Ok(())
    }

    /// Decode the opcode byte fetched last cycle, then run the first
    /// addressing tick in the same host step so the next bus access is
    /// armed.
    fn cpu_decode(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        let opcode = m.value(self.last_read).ok_or(Error::SymbolicOpcode)? as u8;
        self.current_opcode = opcode;
        self.increment_pc(m)?;
        self.addressing_cycle = 0;
        self.execute_cycle = 0;

        let (_, mode) = decode_opcode(opcode).ok_or(Error::UnimplementedOpcode(opcode))?;
        self.addressing_mode = mode;
        self.cpu_state = CpuState::AddressingMode;
        trace!("decode ${opcode:02X}, mode {mode:?}");
        self.addressing_tick(m)
    }

    /// One addressing-mode tick. When the mode finishes assembling
    /// `calc_addr` (or `branch_offset`), it falls through into the first
    /// execute tick of the same host step.
    fn addressing_tick(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        match self.addressing_mode {
            AddressingMode::Imm => {
                // The operand byte is at PC; no bus cycle of its own.
                self.calc_addr = self.pc;
                self.increment_pc(m)?;
                self.begin_execute(m)
            }

            AddressingMode::Abs => match self.addressing_cycle {
                0 => {
                    self.cpu_read(self.pc);
                    self.increment_pc(m)?;
                    self.addressing_cycle = 1;
                    Ok(StepOutcome::Continue)
                }
                1 => {
                    // Low byte arrived; stash it in the low half of calc_addr.
                    let zero = m.byte(0);
                    self.calc_addr = m.bv_concat(zero, self.last_read)?;
                    self.cpu_read(self.pc);
                    self.increment_pc(m)?;
                    self.addressing_cycle = 2;
                    Ok(StepOutcome::Continue)
                }
                2 => {
                    let low = m.bv_extract(self.calc_addr, 7, 0)?;
                    self.calc_addr = m.bv_concat(self.last_read, low)?;
                    self.begin_execute(m)
                }
                _ => unreachable!("absolute addressing past its last cycle"),
            },

            AddressingMode::Rel => match self.addressing_cycle {
                0 => {
                    self.cpu_read(self.pc);
                    self.increment_pc(m)?;
                    self.addressing_cycle = 1;
                    Ok(StepOutcome::Continue)
                }
                1 => {
                    if !m.is_concrete(self.last_read) {
                        return Err(Error::SymbolicBranchOffset);
                    }
                    self.branch_offset = self.last_read;
                    self.begin_execute(m)
                }
                _ => unreachable!("relative addressing past its last cycle"),
            },

            AddressingMode::Abx => match self.addressing_cycle {
                0 => {
                    self.cpu_read(self.pc);
                    self.increment_pc(m)?;
                    self.addressing_cycle = 1;
                    Ok(StepOutcome::Continue)
                }
                1 => {
                    let zero = m.byte(0);
                    self.calc_addr = m.bv_concat(zero, self.last_read)?;
                    self.cpu_read(self.pc);
                    self.increment_pc(m)?;
                    self.addressing_cycle = 2;
                    Ok(StepOutcome::Continue)
                }
                2 => {
                    let high = self.last_read;
                    let low = m.bv_extract(self.calc_addr, 7, 0)?;
                    let indexed = m.bv_add(low, self.x)?;
                    // The page-cross decision needs concrete index arithmetic.
                    let low_v = m.value(low).ok_or(Error::SymbolicAddress)?;
                    let x_v = m.value(self.x).ok_or(Error::SymbolicAddress)?;
                    self.calc_addr = m.bv_concat(high, indexed)?;
                    if low_v + x_v > 0xFF {
                        // Burn a cycle reading the uncorrected address.
                        self.cpu_read(self.calc_addr);
                        self.addressing_cycle = 3;
                        Ok(StepOutcome::Continue)
                    } else {
                        self.begin_execute(m)
                    }
                }
                3 => {
                    // Fix up the high byte after the page cross.
                    let high = m.bv_extract(self.calc_addr, 15, 8)?;
                    let one = m.byte(1);
                    let high = m.bv_add(high, one)?;
                    let low = m.bv_extract(self.calc_addr, 7, 0)?;
                    self.calc_addr = m.bv_concat(high, low)?;
                    self.begin_execute(m)
                }
                _ => unreachable!("indexed addressing past its last cycle"),
            },

            mode => Err(Error::UnimplementedAddressingMode(mode)),
        }
    }

    fn begin_execute(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        self.cpu_state = CpuState::Execute;
        self.execute_cycle = 0;
        self.execute_tick(m)
    }

    /// One execute tick of the current opcode family.
    fn execute_tick(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        let (family, _) =
            decode_opcode(self.current_opcode).ok_or(Error::UnimplementedOpcode(self.current_opcode))?;
        match family {
            Family::And => self.exec_and(m),
            Family::Cmp => self.exec_cmp(m),
            Family::Lda => self.exec_load(m, LoadTarget::A),
            Family::Ldx => self.exec_load(m, LoadTarget::X),
            Family::Ldy => self.exec_load(m, LoadTarget::Y),
            Family::Sta => self.exec_store(m, self.a),
            Family::Stx => self.exec_store(m, self.x),
            Family::Sty => self.exec_store(m, self.y),
            Family::Branch => self.exec_branch(m),
        }
    }

    fn exec_and(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        match self.execute_cycle {
            0 => {
                self.cpu_read(self.calc_addr);
                self.execute_cycle = 1;
            }
            1 => {
                self.a = m.bv_and(self.a, self.last_read)?;
                self.set_flags_zn(m, self.a)?;
                self.instruction_fetch();
            }
            _ => unreachable!("AND past its last cycle"),
        }
        Ok(StepOutcome::Continue)
    }

    fn exec_cmp(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        match self.execute_cycle {
            0 => {
                self.cpu_read(self.calc_addr);
                self.execute_cycle = 1;
            }
            1 => {
                let result = m.bv_sub(self.a, self.last_read)?;
                self.set_flag_c(m, result)?;
                self.set_flags_zn(m, result)?;
                self.instruction_fetch();
            }
            _ => unreachable!("CMP past its last cycle"),
        }
        Ok(StepOutcome::Continue)
    }

    fn exec_load(&mut self, m: &mut AstManager, target: LoadTarget) -> Result<StepOutcome> {
        match self.execute_cycle {
            0 => {
                self.cpu_read(self.calc_addr);
                self.execute_cycle = 1;
            }
            1 => {
                let value = self.last_read;
                match target {
                    LoadTarget::A => self.a = value,
                    LoadTarget::X => self.x = value,
                    LoadTarget::Y => self.y = value,
                }
                self.set_flags_zn(m, value)?;
                self.instruction_fetch();
            }
            _ => unreachable!("load past its last cycle"),
        }
        Ok(StepOutcome::Continue)
    }

    fn exec_store(&mut self, _m: &mut AstManager, value: TermId) -> Result<StepOutcome> {
        match self.execute_cycle {
            0 => {
                self.cpu_write(self.calc_addr, value);
                self.execute_cycle = 1;
            }
            1 => {
                self.instruction_fetch();
            }
            _ => unreachable!("store past its last cycle"),
        }
        Ok(StepOutcome::Continue)
    }

    /// Branch micro-sequence. A concrete condition runs the 2/3/4-cycle
    /// protocol; a symbolic condition forks the context.
    fn exec_branch(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        match self.execute_cycle {
            0 => {
                let condition = self.branch_condition(m)?;
                match m.value(condition) {
                    Some(0) => {
                        // Not taken.
                        self.instruction_fetch();
                        Ok(StepOutcome::Continue)
                    }
                    Some(_) => {
                        // Taken: dummy read while the new PC is computed.
                        self.cpu_read(self.pc);
                        self.execute_cycle = 1;
                        Ok(StepOutcome::Continue)
                    }
                    None => self.fork_on_branch(m, condition),
                }
            }
            1 => {
                let offset = m.value(self.branch_offset).ok_or(Error::SymbolicBranchOffset)?;
                let pc_low = m.bv_extract(self.pc, 7, 0)?;
                let low_v = m.value(pc_low).ok_or(Error::SymbolicAddress)?;
                let new_low = m.bv_add(pc_low, self.branch_offset)?;
                let pc_high = m.bv_extract(self.pc, 15, 8)?;
                self.pc = m.bv_concat(pc_high, new_low)?;

                // Page cross: the signed offset escaped the current page.
                let sum = low_v + offset;
                let backward = offset & 0x80 != 0;
                let crossed = if backward { sum < 0x100 } else { sum > 0xFF };
                if crossed {
                    self.cpu_read(self.pc);
                    self.execute_cycle = 2;
                } else {
                    self.instruction_fetch();
                }
                Ok(StepOutcome::Continue)
            }
            2 => {
                // Correct the high byte by the offset direction.
                let offset = m.value(self.branch_offset).ok_or(Error::SymbolicBranchOffset)?;
                let pc_high = m.bv_extract(self.pc, 15, 8)?;
                let one = m.byte(1);
                let pc_high = if offset & 0x80 != 0 {
                    m.bv_sub(pc_high, one)?
                } else {
                    m.bv_add(pc_high, one)?
                };
                let pc_low = m.bv_extract(self.pc, 7, 0)?;
                self.pc = m.bv_concat(pc_high, pc_low)?;
                self.instruction_fetch();
                Ok(StepOutcome::Continue)
            }
            _ => unreachable!("branch past its last cycle"),
        }
    }

    /// Condition term for the current branch opcode: a flag or its negation.
    fn branch_condition(&mut self, m: &mut AstManager) -> Result<TermId> {
        let condition = match self.current_opcode {
            0x10 => m.not(self.flag_n)?, // BPL
            0x30 => self.flag_n,         // BMI
            0x50 => m.not(self.flag_v)?, // BVC
            0x70 => self.flag_v,         // BVS
            0x90 => m.not(self.flag_c)?, // BCC
            0xB0 => self.flag_c,         // BCS
            0xD0 => m.not(self.flag_z)?, // BNE
            0xF0 => self.flag_z,         // BEQ
            other => return Err(Error::UnimplementedOpcode(other)),
        };
        Ok(condition)
    }

    /// Fork on a symbolic branch condition: retire this context and build
    /// one child per branch direction, each with the matching path
    /// constraint and CPU micro-state.
    fn fork_on_branch(&mut self, m: &mut AstManager, condition: TermId) -> Result<StepOutcome> {
        let negated = m.not(condition)?;
        trace!(
            "forking on symbolic branch ${:02X} at cycle {}",
            self.current_opcode,
            self.cpu_cycle_count
        );

        let mut taken = self.fork(m);
        taken.path_constraints.push(condition);
        taken.cpu_read(taken.pc);
        taken.execute_cycle = 1;

        let mut skipped = self.fork(m);
        skipped.path_constraints.push(negated);
        skipped.instruction_fetch();

        Ok(StepOutcome::Forked(Box::new(taken), Box::new(skipped)))
    }

    // --- flag setters ------------------------------------------------------

    /// `FZ := (test == 0)`, `FN := ((test >> 7) == 1)`.
    fn set_flags_zn(&mut self, m: &mut AstManager, test: TermId) -> Result<()> {
        let zero = m.byte(0);
        self.flag_z = m.eq(test, zero)?;
        let seven = m.byte(7);
        let top = m.bv_lshr(test, seven)?;
        let one = m.byte(1);
        self.flag_n = m.eq(top, one)?;
        Ok(())
    }

    /// `FC := (test >=s 0)`.
    fn set_flag_c(&mut self, m: &mut AstManager, test: TermId) -> Result<()> {
        let zero = m.byte(0);
        self.flag_c = m.bv_sge(test, zero)?;
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum LoadTarget {
    A,
    X,
    Y,
}
