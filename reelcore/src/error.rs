//! Top-level error kinds shared across the loader, cast manager, and VM.
//!
//! Loader errors are terminal for the file being loaded. VM errors marked
//! fatal below abort only the current top-level dispatch; the VM remains
//! usable for the next tick.

use crate::value::Symbol;
use std::io;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("unrecognized root tag")]
    BadFormat,

    #[error("corrupt chunk: {0}")]
    CorruptChunk(String),

    #[error("unsupported file version: {0}")]
    UnsupportedVersion(u16),

    #[error("chunk uses unsupported compression {0:?}")]
    UnsupportedCompression(crate::container::CompressionKind),

    #[error("unresolved member: {0:?}")]
    UnresolvedMember(crate::value::MemberRef),

    #[error("unresolved handler: {0}")]
    UnresolvedHandler(Symbol),

    #[error("unresolved name id {0}")]
    UnresolvedName(u32),

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("unknown opcode 0x{0:02x} at offset {1}")]
    UnknownOpcode(u8, u32),

    #[error("ancestor chain cycle detected")]
    AncestorCycle,

    #[error("step limit exceeded")]
    StepLimitExceeded,

    #[error("network failure: {0}")]
    NetFailure(String),
}

impl Error {
    /// VM errors that abort only the current top-level dispatch rather than
    /// the whole runtime. Unknown opcodes are tolerated by the interpreter
    /// itself (traced, not raised), so they never reach this check.
    #[must_use]
    pub fn is_vm_fatal(&self) -> bool {
        matches!(self, Self::StackUnderflow | Self::AncestorCycle | Self::StepLimitExceeded)
    }
}
