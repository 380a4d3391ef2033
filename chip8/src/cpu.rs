//! CPU and memory state.
use crate::{
    constants::*,
    error::{Chip8Error, Chip8Result},
};

/// Core state for a chip8 interpreter.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the next instruction to fetch.
    pub(crate) pc: Address,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address. Since addresses are 12 bits, only the
    /// lowest (rightmost) bits are used.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: u8,
    /// Register waiting to be loaded with the next key press.
    ///
    /// Execution is paused while this is set.
    pub(crate) key_wait: Option<u8>,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: Vec<Address>,
    /// Maximum depth of the call stack.
    stack_size: usize,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self::new(STACK_SIZE)
    }
}

impl Chip8Cpu {
    pub fn new(stack_size: usize) -> Self {
        Self {
            pc: MEM_START as Address,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_wait: None,

            ram: Box::new([0; MEM_SIZE]),
            stack: Vec::with_capacity(stack_size),
            stack_size,
        }
    }

    /// Set all registers, memory and the stack back to their power-on state.
    pub(crate) fn reset(&mut self) {
        self.pc = MEM_START as Address;
        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.key_wait = None;
        self.ram.fill(0);
        self.stack.clear();
    }

    /// Whether execution is suspended, waiting for a key press.
    #[inline(always)]
    pub fn is_paused(&self) -> bool {
        self.key_wait.is_some()
    }

    /// Count down the delay and sound timers, stopping at zero.
    #[inline]
    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Fetch the big-endian instruction at the program counter.
    #[inline]
    pub fn fetch(&self) -> Chip8Result<u16> {
        let bytes = self.read(self.pc, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Borrow `len` bytes of memory starting at `addr`.
    pub fn read(&self, addr: Address, len: usize) -> Chip8Result<&[u8]> {
        let range = mem_range(addr, len)?;
        Ok(&self.ram[range])
    }

    /// Copy `data` into memory starting at `addr`.
    ///
    /// Nothing is written when the data does not fit.
    pub fn write(&mut self, addr: Address, data: &[u8]) -> Chip8Result<()> {
        let range = mem_range(addr, data.len())?;
        self.ram[range].copy_from_slice(data);
        Ok(())
    }

    /// Push a return address onto the call stack.
    ///
    /// `addr` is the location of the `CALL` instruction, for error reporting.
    pub(crate) fn push(&mut self, return_addr: Address, addr: Address) -> Chip8Result<()> {
        if self.stack.len() >= self.stack_size {
            return Err(Chip8Error::StackOverflow { address: addr });
        }
        self.stack.push(return_addr);
        Ok(())
    }

    /// Pop a return address from the call stack.
    ///
    /// `addr` is the location of the `RET` instruction, for error reporting.
    pub(crate) fn pop(&mut self, addr: Address) -> Chip8Result<Address> {
        self.stack
            .pop()
            .ok_or(Chip8Error::StackUnderflow { address: addr })
    }
}

/// Memory range for an access, or the first address past the end of memory.
#[inline]
fn mem_range(addr: Address, len: usize) -> Chip8Result<std::ops::Range<usize>> {
    let start = addr as usize;
    let end = start + len;
    if end > MEM_SIZE {
        Err(Chip8Error::MemoryOutOfBounds {
            address: start.max(MEM_SIZE),
        })
    } else {
        Ok(start..end)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fetch_big_endian() {
        let mut cpu = Chip8Cpu::default();
        cpu.write(0x200, &[0x12, 0x34]).unwrap();
        assert_eq!(cpu.fetch(), Ok(0x1234));
    }

    #[test]
    fn test_fetch_past_end_of_memory() {
        let mut cpu = Chip8Cpu::default();
        cpu.pc = 0xFFF;
        assert_eq!(
            cpu.fetch(),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        );
    }

    #[test]
    fn test_write_does_not_partially_apply() {
        let mut cpu = Chip8Cpu::default();
        assert!(cpu.write(0xFFE, &[1, 2, 3]).is_err());
        assert_eq!(cpu.ram[0xFFE], 0);
        assert_eq!(cpu.ram[0xFFF], 0);

        cpu.write(0xFFD, &[1, 2, 3]).unwrap();
        assert_eq!(&cpu.ram[0xFFD..], &[1, 2, 3]);
    }

    #[test]
    fn test_stack_bounds() {
        let mut cpu = Chip8Cpu::new(2);
        cpu.push(0x202, 0x200).unwrap();
        cpu.push(0x302, 0x300).unwrap();
        assert_eq!(
            cpu.push(0x402, 0x400),
            Err(Chip8Error::StackOverflow { address: 0x400 })
        );

        assert_eq!(cpu.pop(0x500), Ok(0x302));
        assert_eq!(cpu.pop(0x500), Ok(0x202));
        assert_eq!(
            cpu.pop(0x500),
            Err(Chip8Error::StackUnderflow { address: 0x500 })
        );
    }

    #[test]
    fn test_timers_stop_at_zero() {
        let mut cpu = Chip8Cpu::default();
        cpu.delay_timer = 1;
        cpu.sound_timer = 2;

        cpu.tick_timers();
        assert_eq!((cpu.delay_timer, cpu.sound_timer), (0, 1));
        cpu.tick_timers();
        cpu.tick_timers();
        assert_eq!((cpu.delay_timer, cpu.sound_timer), (0, 0));
    }
}
