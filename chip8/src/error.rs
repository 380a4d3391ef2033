//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::{Address, FONTSET_DATA_LENGTH, MAX_PROGRAM_SIZE};

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

/// Faults raised by the virtual machine.
///
/// Every runtime variant is fatal. Once raised, the VM is halted and
/// keeps returning the same error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chip8Error {
    /// The instruction at `address` matches no known opcode.
    UnknownOpcode { address: Address, opcode: u16 },
    /// `RET` was executed with an empty call stack.
    StackUnderflow { address: Address },
    /// `CALL` was executed with a full call stack.
    StackOverflow { address: Address },
    /// An instruction tried to access memory outside of the 4KiB address space.
    MemoryOutOfBounds { address: usize },
    /// Attempt to load a bytecode program that can't fit in memory.
    LargeProgram { size: usize },
    /// Fontset data has the wrong length.
    Font { size: usize },
    Fmt(fmt::Error),
}

impl Chip8Error {
    /// Whether the error was raised by executing the loaded program,
    /// as opposed to setting up the machine.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::UnknownOpcode { .. }
                | Self::StackUnderflow { .. }
                | Self::StackOverflow { .. }
                | Self::MemoryOutOfBounds { .. }
        )
    }
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOpcode { address, opcode } => {
                write!(f, "unknown opcode {opcode:04X} at address {address:03X}")
            }
            Self::StackUnderflow { address } => {
                write!(f, "call stack underflow at address {address:03X}")
            }
            Self::StackOverflow { address } => {
                write!(f, "call stack overflow at address {address:03X}")
            }
            Self::MemoryOutOfBounds { address } => {
                write!(f, "memory access out of bounds at address {address:04X}")
            }
            Self::LargeProgram { size } => write!(
                f,
                "program too large for VM memory: {size} bytes, maximum is {MAX_PROGRAM_SIZE}"
            ),
            Self::Font { size } => write!(
                f,
                "fontset data must be {FONTSET_DATA_LENGTH} bytes, got {size}"
            ),
            Self::Fmt(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Chip8Error {}

impl From<fmt::Error> for Chip8Error {
    fn from(err: fmt::Error) -> Self {
        Chip8Error::Fmt(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Chip8Error::UnknownOpcode {
            address: 0x200,
            opcode: 0x5001,
        };
        assert_eq!(err.to_string(), "unknown opcode 5001 at address 200");
        assert!(err.is_fault());
        assert!(!Chip8Error::LargeProgram { size: 4000 }.is_fault());
    }
}
