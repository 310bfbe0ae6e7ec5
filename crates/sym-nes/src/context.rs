//! Execution context: one speculative machine snapshot.
//!
//! A root context owns its RAM outright. Forking freezes the current RAM
//! into a shared snapshot and leaves both the retired parent and every
//! child with an empty copy-on-write overlay over it, so no write in one
//! path can ever be observed from another. ROM pages and the mapper are
//! shared by reference and immutable after load.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use log::trace;
use sym_ast::{AstManager, TermId};

use crate::bus::Bank;
use crate::cartridge::RomImage;
use crate::controller::Controller;
use crate::decode::AddressingMode;
use crate::error::{Error, Result};
use crate::mapper::Mapper;

/// Internal RAM size in cells.
pub(crate) const RAM_CELLS: usize = 0x800;

/// CPU execution state: reset micro-steps, then the
/// decode/addressing/execute instruction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CpuState {
    Reset1,
    Reset2,
    Reset3,
    Reset4,
    Reset5,
    Reset6,
    Reset7,
    Decode,
    AddressingMode,
    Execute,
}

/// What a completed step means for the scheduler.
#[derive(Debug)]
pub enum StepOutcome {
    /// The context remains runnable.
    Continue,
    /// The context retired after forking on a symbolic branch condition.
    /// The children carry the branch condition and its negation as path
    /// constraints, in that order.
    Forked(Box<Context>, Box<Context>),
}

/// 2K internal RAM with copy-on-write forking.
#[derive(Debug, Clone)]
pub(crate) enum Ram {
    /// Exclusively owned cells (root context).
    Root(Box<[TermId; RAM_CELLS]>),
    /// Overlay of local writes over a frozen parent snapshot.
    Cow {
        overlay: HashMap<u16, TermId>,
        parent: Rc<Ram>,
    },
}

impl Ram {
    fn read(&self, addr: u16) -> TermId {
        match self {
            Self::Root(cells) => cells[addr as usize],
            Self::Cow { overlay, parent } => overlay
                .get(&addr)
                .copied()
                .unwrap_or_else(|| parent.read(addr)),
        }
    }

    fn write(&mut self, addr: u16, value: TermId) {
        match self {
            Self::Root(cells) => cells[addr as usize] = value,
            Self::Cow { overlay, .. } => {
                overlay.insert(addr, value);
            }
        }
    }
}

/// One speculative execution path: CPU, bus, memory map, controller, and
/// path constraints.
#[derive(Clone)]
pub struct Context {
    // CPU registers.
    pub(crate) a: TermId,
    pub(crate) x: TermId,
    pub(crate) y: TermId,
    pub(crate) sp: TermId,
    pub(crate) pc: TermId,
    // Flags, each a boolean term. P = [7] N V - - D I Z C [0].
    pub(crate) flag_c: TermId,
    pub(crate) flag_z: TermId,
    pub(crate) flag_i: TermId,
    pub(crate) flag_d: TermId,
    pub(crate) flag_v: TermId,
    pub(crate) flag_n: TermId,

    // CPU sub-state.
    pub(crate) cpu_state: CpuState,
    pub(crate) addressing_mode: AddressingMode,
    pub(crate) addressing_cycle: u8,
    pub(crate) execute_cycle: u8,
    pub(crate) current_opcode: u8,
    pub(crate) calc_addr: TermId,
    pub(crate) branch_offset: TermId,

    // Address bus latches.
    pub(crate) address: TermId,
    pub(crate) write_enable: bool,
    pub(crate) data_out: TermId,
    pub(crate) last_read: TermId,
    /// True while an armed access awaits completion. Preserved across fork
    /// so a child never repeats a memory-mapped side effect the parent
    /// already committed.
    pub(crate) memory_phase_pending: bool,

    // Memory map.
    pub(crate) banks: [Bank; 16],
    pub(crate) ram: Ram,
    pub(crate) rom: Option<Rc<RomImage>>,
    pub(crate) mapper: Option<Rc<dyn Mapper>>,

    // Controller port 1.
    pub(crate) controller1: Controller,
    /// Symbolic input variables minted by controller strobes, in order.
    pub(crate) inputs: Vec<TermId>,

    /// Ordered path constraints accumulated at fork points.
    pub(crate) path_constraints: Vec<TermId>,

    // Bookkeeping.
    pub(crate) step_count: u64,
    pub(crate) cpu_cycle_count: u64,
    pub(crate) frame_number: u32,
    pub(crate) has_forked: bool,
    pub(crate) priority: i32,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("pc", &self.pc)
            .field("cpu_state", &self.cpu_state)
            .field("addressing_mode", &self.addressing_mode)
            .field("step_count", &self.step_count)
            .field("cpu_cycle_count", &self.cpu_cycle_count)
            .field("has_forked", &self.has_forked)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a root context: all state concretely zero, the bus armed for
    /// the first reset micro-step.
    pub fn new(m: &mut AstManager) -> Self {
        let zero_byte = m.byte(0);
        let zero_half = m.halfword(0);
        let flag_off = m.bool_const(false);

        Self {
            a: zero_byte,
            x: zero_byte,
            y: zero_byte,
            sp: zero_byte,
            pc: zero_half,
            flag_c: flag_off,
            flag_z: flag_off,
            flag_i: flag_off,
            flag_d: flag_off,
            flag_v: flag_off,
            flag_n: flag_off,
            cpu_state: CpuState::Reset1,
            addressing_mode: AddressingMode::Imm,
            addressing_cycle: 0,
            execute_cycle: 0,
            current_opcode: 0,
            calc_addr: zero_half,
            branch_offset: zero_byte,
            address: zero_half,
            write_enable: false,
            data_out: zero_byte,
            last_read: zero_byte,
            memory_phase_pending: true,
            banks: Bank::default_map(),
            ram: Ram::Root(Box::new([zero_byte; RAM_CELLS])),
            rom: None,
            mapper: None,
            controller1: Controller::new(1, zero_byte),
            inputs: Vec::new(),
            path_constraints: Vec::new(),
            step_count: 0,
            cpu_cycle_count: 0,
            frame_number: 0,
            has_forked: false,
            priority: 0,
        }
    }

    /// Fork one child. The current RAM contents freeze into a shared
    /// snapshot; the retired parent and the child both continue as empty
    /// overlays over it. Terms, bank tables, counters, and controller state
    /// carry over; ROM and mapper are shared.
    pub fn fork(&mut self, m: &mut AstManager) -> Context {
        let zero = m.byte(0);
        let frozen = Rc::new(mem::replace(
            &mut self.ram,
            Ram::Root(Box::new([zero; RAM_CELLS])),
        ));
        self.ram = Ram::Cow {
            overlay: HashMap::new(),
            parent: Rc::clone(&frozen),
        };
        self.has_forked = true;

        let mut child = self.clone();
        child.has_forked = false;
        child
    }

    /// Advance exactly one CPU cycle: complete the access armed in the
    /// previous cycle, then run the state machine, which arms the next one.
    ///
    /// # Errors
    ///
    /// Any of the fatal conditions of the engine: symbolic address, opcode,
    /// branch offset, or strobe; unimplemented opcode or addressing mode.
    pub fn step(&mut self, m: &mut AstManager) -> Result<StepOutcome> {
        self.step_count += 1;
        self.cpu_cycle_count += 1;
        self.complete_memory_phase(m)?;
        let outcome = self.step_cpu(m)?;

        if let StepOutcome::Continue = outcome {
            if let Some(mapper) = self.mapper.clone() {
                mapper.cpu_cycle(self);
            }
        }
        Ok(outcome)
    }

    /// Phase 1: resolve the armed bus access. The address must be concrete;
    /// dispatch goes by the high nibble of the address.
    fn complete_memory_phase(&mut self, m: &mut AstManager) -> Result<()> {
        if !self.memory_phase_pending {
            return Ok(());
        }
        self.memory_phase_pending = false;

        let addr = m.value(self.address).ok_or(Error::SymbolicAddress)? as u16;
        let bank = usize::from((addr >> 12) & 0xF);
        let offset = addr & 0x0FFF;

        if self.write_enable {
            self.bus_write(m, bank, offset, self.data_out)?;
        } else if let Some(data) = self.bus_read(m, bank, offset)? {
            self.last_read = data;
        } else {
            // Open bus: the handler had nothing to drive, the latch keeps
            // its previous value.
            trace!("open-bus read at ${addr:04X}");
        }
        Ok(())
    }

    /// Arm a read for completion at the start of the next cycle.
    pub(crate) fn cpu_read(&mut self, address: TermId) {
        self.address = address;
        self.write_enable = false;
        self.memory_phase_pending = true;
    }

    /// Arm a write for completion at the start of the next cycle.
    pub(crate) fn cpu_write(&mut self, address: TermId, data: TermId) {
        self.address = address;
        self.write_enable = true;
        self.data_out = data;
        self.memory_phase_pending = true;
    }

    /// Read an internal RAM cell (address already masked to the 2K window).
    #[must_use]
    pub fn read_ram(&self, addr: u16) -> TermId {
        self.ram.read(addr & 0x07FF)
    }

    /// Write an internal RAM cell. In a forked context the write lands in
    /// the local overlay only; the parent snapshot is never touched.
    pub fn write_ram(&mut self, addr: u16, value: TermId) {
        self.ram.write(addr & 0x07FF, value);
    }

    // --- accessors ---------------------------------------------------------

    #[must_use]
    pub fn cpu_a(&self) -> TermId {
        self.a
    }

    #[must_use]
    pub fn cpu_x(&self) -> TermId {
        self.x
    }

    #[must_use]
    pub fn cpu_y(&self) -> TermId {
        self.y
    }

    #[must_use]
    pub fn cpu_sp(&self) -> TermId {
        self.sp
    }

    #[must_use]
    pub fn cpu_pc(&self) -> TermId {
        self.pc
    }

    #[must_use]
    pub fn flag_c(&self) -> TermId {
        self.flag_c
    }

    #[must_use]
    pub fn flag_z(&self) -> TermId {
        self.flag_z
    }

    #[must_use]
    pub fn flag_i(&self) -> TermId {
        self.flag_i
    }

    #[must_use]
    pub fn flag_d(&self) -> TermId {
        self.flag_d
    }

    #[must_use]
    pub fn flag_v(&self) -> TermId {
        self.flag_v
    }

    #[must_use]
    pub fn flag_n(&self) -> TermId {
        self.flag_n
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    #[must_use]
    pub fn cpu_cycle_count(&self) -> u64 {
        self.cpu_cycle_count
    }

    #[must_use]
    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    #[must_use]
    pub fn has_forked(&self) -> bool {
        self.has_forked
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    /// Symbolic controller input variables minted so far, in strobe order.
    #[must_use]
    pub fn inputs(&self) -> &[TermId] {
        &self.inputs
    }

    /// Path constraints accumulated at fork points, in order. Hand these to
    /// the solver together with a goal assertion to realise this path.
    #[must_use]
    pub fn path_constraints(&self) -> &[TermId] {
        &self.path_constraints
    }

    /// Attached ROM image, if a cartridge has been loaded.
    #[must_use]
    pub fn rom(&self) -> Option<&Rc<RomImage>> {
        self.rom.as_ref()
    }
}
