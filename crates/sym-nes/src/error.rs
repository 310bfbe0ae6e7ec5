//! Context, loader, and mapper errors.

use thiserror::Error;

use crate::decode::AddressingMode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The iNES header is missing, corrupt, or describes a layout this
    /// engine rejects (DiskDude damage, NES 2.0, trained ROMs, non-zero
    /// reserved bytes).
    #[error("unsupported iNES header: {0}")]
    UnsupportedHeader(String),

    /// The mapper id has no implementation.
    #[error("unknown mapper id {0}")]
    UnknownMapper(u8),

    /// The memory phase observed a non-concrete bus address.
    #[error("symbolic address on the bus")]
    SymbolicAddress,

    /// Decode observed a non-concrete opcode byte.
    #[error("symbolic opcode at decode")]
    SymbolicOpcode,

    /// Relative addressing produced a non-concrete branch offset.
    #[error("symbolic branch offset")]
    SymbolicBranchOffset,

    /// A controller strobe write carried a non-concrete value.
    #[error("symbolic controller strobe value")]
    SymbolicStrobe,

    /// The decoded opcode has no execution clause.
    #[error("unimplemented opcode ${0:02X}")]
    UnimplementedOpcode(u8),

    /// The decoded addressing mode has no micro-sequence.
    #[error("unimplemented addressing mode {0:?}")]
    UnimplementedAddressingMode(AddressingMode),

    /// Term construction failed inside the CPU engine.
    #[error(transparent)]
    Term(#[from] sym_ast::Error),
}
