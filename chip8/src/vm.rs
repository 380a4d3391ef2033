//! Virtual machine.
use std::{fmt::Write, time::Duration};

use rand::prelude::*;

use crate::{
    constants::*,
    cpu::Chip8Cpu,
    devices::{Buzzer, KeyCode, Keyboard, Screen, Tone},
    error::{Chip8Error, Chip8Result},
    framebuffer::FrameBuffer,
    keypad::Keypad,
    op::{Op, UnknownOpcode},
};

/// Chip-8 virtual machine.
///
/// Owns the CPU state and the IO devices it drives. A host calls
/// [`Chip8Vm::cycle`] once per frame, at [`Chip8Conf::frame_rate`].
pub struct Chip8Vm<S = FrameBuffer, K = Keypad, T = Buzzer> {
    cpu: Chip8Cpu,
    screen: S,
    keyboard: K,
    tone: T,
    rng: StdRng,
    /// Fault that halted the machine.
    fault: Option<Chip8Error>,
    conf: Chip8Conf,
}

impl Chip8Vm {
    /// Creates a VM with headless devices.
    pub fn new(conf: Chip8Conf) -> Self {
        Self::with_devices(conf, FrameBuffer::new(), Keypad::new(), Buzzer::new())
    }
}

impl<S, K, T> Chip8Vm<S, K, T>
where
    S: Screen,
    K: Keyboard,
    T: Tone,
{
    pub fn with_devices(conf: Chip8Conf, screen: S, keyboard: K, tone: T) -> Self {
        let rng = match conf.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut vm = Chip8Vm {
            cpu: Chip8Cpu::new(conf.stack_size),
            screen,
            keyboard,
            tone,
            rng,
            fault: None,
            conf,
        };
        vm.load_builtin_font();
        vm
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    pub fn load_builtin_font(&mut self) {
        self.cpu.ram[FONTSET_START as usize..FONTSET_DATA_LENGTH].copy_from_slice(&FONTSET);
    }

    /// Replace the builtin font.
    ///
    /// Loading a program restores the builtin font, so this must be
    /// called after [`Chip8Vm::load_bytecode`].
    pub fn load_font(&mut self, fontset: &[u8]) -> Chip8Result<()> {
        if fontset.len() != FONTSET_DATA_LENGTH {
            return Err(Chip8Error::Font {
                size: fontset.len(),
            });
        }

        self.cpu.write(FONTSET_START, fontset)
    }

    pub fn load_bytecode(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if bytecode.len() > MAX_PROGRAM_SIZE {
            return Err(Chip8Error::LargeProgram {
                size: bytecode.len(),
            });
        }

        // Start with clean memory to avoid leaking previous program.
        self.cpu.reset();
        self.screen.clear();
        self.fault = None;

        // Reset fonts
        self.load_builtin_font();

        // Load program into virtual RAM
        self.cpu.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);

        log::debug!("loaded program of {} bytes", bytecode.len());

        Ok(())
    }
}

/// Control flow signalled by a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    Draw,
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

/// VM Configuration Parameters.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct Chip8Conf {
    /// Number of instructions executed per cycle.
    pub speed: usize,
    /// Pitch of the tone played while the sound timer is running.
    pub tone_frequency: Hz,
    /// Rate at which the host should call [`Chip8Vm::cycle`].
    pub frame_rate: Hz,
    /// Levels of nesting allowed in the call stack.
    pub stack_size: usize,
    /// Seed for the random number generator used by `Cxnn (RND Vx, byte)`.
    pub seed: Option<u64>,
}

impl Default for Chip8Conf {
    fn default() -> Self {
        Self {
            speed: DEFAULT_SPEED,
            tone_frequency: Hz(DEFAULT_TONE_FREQUENCY),
            frame_rate: Hz(DELAY_FREQUENCY),
            stack_size: STACK_SIZE,
            seed: None,
        }
    }
}

/// Frequency in hertz (per second)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(transparent))]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

/// Interpreter
impl<S, K, T> Chip8Vm<S, K, T>
where
    S: Screen,
    K: Keyboard,
    T: Tone,
{
    /// Run one frame.
    ///
    /// Executes up to [`Chip8Conf::speed`] instructions, stopping early when
    /// the program waits for a key press. Then counts down the timers, gates
    /// the tone and presents the screen.
    pub fn cycle(&mut self) -> Chip8Result<()> {
        self.check_fault()?;

        for _ in 0..self.conf.speed {
            if self.step()? == Flow::KeyWait {
                break;
            }
        }

        // Timers are frozen while waiting for a key.
        if !self.cpu.is_paused() {
            self.cpu.tick_timers();
        }

        // Buzzer should be on while sound timer counts down,
        // then turned off when the timer reaches zero.
        if self.cpu.sound_timer > 0 {
            self.tone.start(self.conf.tone_frequency);
        } else {
            self.tone.stop();
        }

        self.screen.render();

        Ok(())
    }

    /// Execute a single instruction.
    ///
    /// While waiting for a key press nothing is executed, and
    /// [`Flow::KeyWait`] is returned.
    pub fn step(&mut self) -> Chip8Result<Flow> {
        self.check_fault()?;

        if let Some(vx) = self.cpu.key_wait {
            match self.keyboard.take_next_key() {
                Some(key) => {
                    log::debug!("resuming with {key} in v{vx:X}");
                    self.cpu.registers[vx as usize] = key.as_u8();
                    self.cpu.key_wait = None;
                }
                None => return Ok(Flow::KeyWait),
            }
        }

        let address = self.cpu.pc;
        self.fetch_execute(address).map_err(|err| {
            self.halt(err.clone());
            err
        })
    }

    /// Execute `step_count` instructions, ignoring timers.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<Flow> {
        let mut flow = Flow::Ok;

        for _ in 0..step_count {
            flow = self.step()?;
            if flow == Flow::KeyWait {
                break;
            }
        }

        Ok(flow)
    }

    fn check_fault(&self) -> Chip8Result<()> {
        match &self.fault {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn halt(&mut self, err: Chip8Error) {
        log::error!("halted: {err}");
        self.fault = Some(err);
        self.tone.stop();
    }

    fn fetch_execute(&mut self, address: Address) -> Chip8Result<Flow> {
        // Each instruction is two bytes, with the opcode identity in the first 4-bit nibble.
        let opcode = self.cpu.fetch()?;
        let op = Op::decode(opcode)
            .map_err(|UnknownOpcode(opcode)| Chip8Error::UnknownOpcode { address, opcode })?;

        log::trace!("{address:03X}: {opcode:04X} {op}");

        // Jumps must overwrite the advanced counter.
        self.cpu.pc = address + 2;

        self.execute(op, address)
    }

    fn execute(&mut self, op: Op, address: Address) -> Chip8Result<Flow> {
        let flow = match op {
            Op::Sys { .. } => Flow::Ok,
            Op::ClearScreen => {
                self.screen.clear();
                Flow::Draw
            }
            Op::Return => {
                self.cpu.pc = self.cpu.pop(address)?;
                Flow::Jump
            }
            Op::JumpAddress { address } => {
                self.cpu.pc = address;
                Flow::Jump
            }
            Op::Call { address: target } => {
                self.cpu.push(self.cpu.pc, address)?;
                self.cpu.pc = target;
                Flow::Jump
            }
            Op::Skip_Eq_Byte { vx, nn } => self.skip_if(self.reg(vx) == nn),
            Op::Skip_NotEq_Byte { vx, nn } => self.skip_if(self.reg(vx) != nn),
            Op::Skip_Eq { vx, vy } => self.skip_if(self.reg(vx) == self.reg(vy)),
            Op::Load_Byte { vx, nn } => {
                self.cpu.registers[vx as usize] = nn;
                Flow::Ok
            }
            Op::Add_Byte { vx, nn } => {
                self.cpu.registers[vx as usize] = self.reg(vx).wrapping_add(nn);
                Flow::Ok
            }
            Op::Load_Vx_Vy { .. }
            | Op::Or_Vx_Vy { .. }
            | Op::And_Vx_Vy { .. }
            | Op::Xor_Vx_Vy { .. }
            | Op::Add_Vx_Vy { .. }
            | Op::Sub_Vx_Vy { .. }
            | Op::ShiftRight { .. }
            | Op::SubReverse_Vx_Vy { .. }
            | Op::ShiftLeft { .. } => {
                self.exec_math(op);
                Flow::Ok
            }
            Op::Skip_NotEq { vx, vy } => self.skip_if(self.reg(vx) != self.reg(vy)),
            Op::Load_Address { address } => {
                self.cpu.address = address;
                Flow::Ok
            }
            Op::Jump_V0 { address } => {
                self.cpu.pc = address + self.reg(0) as Address;
                Flow::Jump
            }
            Op::Random { vx, nn } => {
                self.cpu.registers[vx as usize] = self.rng.gen::<u8>() & nn;
                Flow::Ok
            }
            Op::Draw { vx, vy, n } => {
                self.draw(vx, vy, n)?;
                Flow::Draw
            }
            Op::Skip_Key { vx } => self.skip_if(self.is_key_down(self.reg(vx))),
            Op::Skip_NotKey { vx } => self.skip_if(!self.is_key_down(self.reg(vx))),
            Op::Load_Vx_Delay { vx } => {
                self.cpu.registers[vx as usize] = self.cpu.delay_timer;
                Flow::Ok
            }
            Op::Load_Vx_Key { vx } => {
                log::debug!("waiting for key press into v{vx:X}");
                self.cpu.key_wait = Some(vx);
                self.keyboard.await_next_key();
                Flow::KeyWait
            }
            Op::Load_Delay_Vx { vx } => {
                self.cpu.delay_timer = self.reg(vx);
                Flow::Ok
            }
            Op::Load_Sound_Vx { vx } => {
                self.cpu.sound_timer = self.reg(vx);
                Flow::Sound
            }
            Op::Add_Address_Vx { vx } => {
                self.cpu.address = self.cpu.address.wrapping_add(self.reg(vx) as Address);
                Flow::Ok
            }
            Op::Load_Font { vx } => {
                let digit = (self.reg(vx) & 0xF) as Address;
                self.cpu.address = FONTSET_START + digit * FONTSET_HEIGHT as Address;
                Flow::Ok
            }
            #[rustfmt::skip]
            Op::Load_Bcd { vx } => {
                let x = self.reg(vx);
                let digits = [
                    x / 100,
                    x / 10  % 10,
                    x       % 10,
                ];
                self.cpu.write(self.cpu.address, &digits)?;
                Flow::Ok
            }
            Op::Store_Registers { vx } => {
                let registers = self.cpu.registers;
                self.cpu.write(self.cpu.address, &registers[..=vx as usize])?;
                Flow::Ok
            }
            Op::Load_Registers { vx } => {
                let count = vx as usize + 1;
                let mut buf = [0; REGISTER_COUNT];
                buf[..count].copy_from_slice(self.cpu.read(self.cpu.address, count)?);
                self.cpu.registers[..count].copy_from_slice(&buf[..count]);
                Flow::Ok
            }
        };

        Ok(flow)
    }

    /// Execute an arithmetic instruction.
    ///
    /// The flag register is written before the result, so when `Vx` is `VF`
    /// the result wins.
    #[inline]
    fn exec_math(&mut self, op: Op) {
        let v = &mut self.cpu.registers;

        match op {
            Op::Load_Vx_Vy { vx, vy } => v[vx as usize] = v[vy as usize],
            Op::Or_Vx_Vy { vx, vy } => v[vx as usize] |= v[vy as usize],
            Op::And_Vx_Vy { vx, vy } => v[vx as usize] &= v[vy as usize],
            Op::Xor_Vx_Vy { vx, vy } => v[vx as usize] ^= v[vy as usize],
            Op::Add_Vx_Vy { vx, vy } => {
                let (sum, carry) = v[vx as usize].overflowing_add(v[vy as usize]);
                v[FLAG_REGISTER] = carry as u8;
                v[vx as usize] = sum;
            }
            Op::Sub_Vx_Vy { vx, vy } => {
                let (x, y) = (v[vx as usize], v[vy as usize]);
                v[FLAG_REGISTER] = (x >= y) as u8;
                v[vx as usize] = x.wrapping_sub(y);
            }
            Op::ShiftRight { vx } => {
                let x = v[vx as usize];
                v[FLAG_REGISTER] = x & 1;
                v[vx as usize] = x >> 1;
            }
            Op::SubReverse_Vx_Vy { vx, vy } => {
                let (x, y) = (v[vx as usize], v[vy as usize]);
                v[FLAG_REGISTER] = (y >= x) as u8;
                v[vx as usize] = y.wrapping_sub(x);
            }
            Op::ShiftLeft { vx } => {
                let x = v[vx as usize];
                v[FLAG_REGISTER] = (x >> 7) & 1;
                v[vx as usize] = x << 1;
            }
            _ => unreachable!("{op} is not an arithmetic instruction"),
        }
    }

    /// Dxyn (DRW Vx, Vy, nibble)
    ///
    /// Draw sprite to the screen, at coordinate as per registers Vx and Vy.
    /// Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
    /// memory pointed to by address register I.
    ///
    /// If the sprite is drawn past the edge of the display area, it is wrapped around to the other side.
    ///
    /// If the drawing operation erases existing pixels, register VF is set to
    /// 1, and set to 0 if no pixels are unset. This is used for collision detection.
    fn draw(&mut self, vx: u8, vy: u8, n: u8) -> Chip8Result<()> {
        let (x, y) = (self.reg(vx) as usize, self.reg(vy) as usize);
        let sprite = self.cpu.read(self.cpu.address, n as usize)?;
        let mut is_erased = false;

        for (r, row) in sprite.iter().copied().enumerate() {
            // Each row is 8 bits representing the 8 pixels of the sprite, MSB first.
            for c in 0..SPRITE_WIDTH {
                if (row >> (SPRITE_WIDTH - 1 - c)) & 1 == 0 {
                    continue;
                }

                let px = wrap(x + c, DISPLAY_WIDTH);
                let py = wrap(y + r, DISPLAY_HEIGHT);

                is_erased |= self.screen.set_pixel(px, py);
            }
        }

        // If a pixel was erased, then a collision occurred.
        self.cpu.registers[FLAG_REGISTER] = is_erased as u8;

        Ok(())
    }

    #[inline(always)]
    fn reg(&self, index: u8) -> u8 {
        self.cpu.registers[index as usize]
    }

    #[inline]
    fn skip_if(&mut self, condition: bool) -> Flow {
        if condition {
            self.cpu.pc += 2;
        }
        Flow::Ok
    }

    /// Key values outside of the keypad are never pressed.
    #[inline]
    fn is_key_down(&self, key_id: u8) -> bool {
        KeyCode::try_from(key_id)
            .map(|key| self.keyboard.is_key_down(key))
            .unwrap_or(false)
    }
}

/// Wrap a coordinate that ran past the edge of the display.
///
/// Only coordinates strictly greater than the bound are wrapped,
/// and only once. Registers are unsigned, so no coordinate is negative.
#[inline]
fn wrap(coord: usize, bound: usize) -> usize {
    if coord > bound {
        coord - bound
    } else {
        coord
    }
}

/// Inspection
impl<S, K, T> Chip8Vm<S, K, T> {
    pub fn pc(&self) -> Address {
        self.cpu.pc
    }

    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.cpu.registers
    }

    /// Value of the index register `I`.
    pub fn address(&self) -> Address {
        self.cpu.address
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    /// Return addresses on the call stack, oldest first.
    pub fn stack(&self) -> &[Address] {
        &self.cpu.stack
    }

    pub fn memory(&self) -> &[u8; MEM_SIZE] {
        &self.cpu.ram
    }

    /// Whether the machine is waiting for a key press.
    pub fn is_paused(&self) -> bool {
        self.cpu.is_paused()
    }

    /// Fault that halted the machine, if any.
    pub fn fault(&self) -> Option<&Chip8Error> {
        self.fault.as_ref()
    }

    pub fn screen(&self) -> &S {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut S {
        &mut self.screen
    }

    pub fn keyboard(&self) -> &K {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut K {
        &mut self.keyboard
    }

    pub fn tone(&self) -> &T {
        &self.tone
    }
}

/// Troubleshooting
impl<S, K, T> Chip8Vm<S, K, T> {
    /// Returns the contents of the memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, std::fmt::Error> {
        let iter = self
            .cpu
            .ram
            .chunks_exact(2)
            .enumerate()
            .skip(MEM_START / 2)
            .take(count / 2);
        let mut buf = String::new();

        for (i, op) in iter {
            writeln!(buf, "{:04X}: {:02X}{:02X}", i * 2, op[0], op[1])?;
        }

        Ok(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vm_with(bytecode: &[u8]) -> Chip8Vm {
        let mut vm = Chip8Vm::new(Chip8Conf {
            seed: Some(8),
            ..Default::default()
        });
        vm.load_bytecode(bytecode).unwrap();
        vm
    }

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);
    }

    /// Fx0A (LD Vx, K)
    ///
    /// Wait for a keypress, then store the key value in Vx.
    /// The VM must stall while waiting, and signal the state to the outer executer.
    #[test]
    #[rustfmt::skip]
    fn test_key_wait() {
        let mut vm = vm_with(&[
            0xF1, 0x0A, // LD v1, K
            0x62, 0x42  // LD v2, 0x42  ; sentinal
        ]);

        assert_eq!(vm.cpu.pc, MEM_START as Address);
        assert_eq!(vm.step(), Ok(Flow::KeyWait));
        assert!(vm.is_paused());
        assert!(vm.keyboard.is_awaiting());

        // machine must stall
        for _ in 0..5 {
            assert_eq!(vm.step(), Ok(Flow::KeyWait));
            assert_eq!(vm.cpu.pc, MEM_START as Address + 2);
            assert_eq!(vm.cpu.registers[2], 0);
        }

        // machine has yielded, waiting for any key to be pressed.
        vm.keyboard.key_down(KeyCode::Key5);

        // machine will now advance
        assert_eq!(vm.step(), Ok(Flow::Ok));
        assert!(!vm.is_paused());
        assert_eq!(vm.cpu.registers[1], 0x05);
        assert_eq!(vm.cpu.registers[2], 0x42); // sentinal
        assert_eq!(vm.cpu.pc, MEM_START as Address + 4);
    }

    /// Booleans must be cast to u8 1 or 0
    #[test]
    fn test_assert_bool_cast() {
        assert_eq!(true as u8, 1);
        assert_eq!(false as u8, 0);
    }

    #[test]
    #[rustfmt::skip]
    fn test_draw_collision() {
        // Draw two sprites next to each other.
        // The zero bits of the second draw must not erase
        // the pixels of the first draw
        //
        // draw sprite 1
        // ____####, vf == 0
        //
        // draw sprite 2
        // ########, vf == 0
        let mut vm = vm_with(&[
            0xA2, 0x0C, // LD I, .sprite
            0x60, 0x04, // LD v0, 4
            0x61, 0x00, // LD v1, 0
            0xD0, 0x11, // DRW v0, v1, 1
            0x60, 0x00, // LD v0, 0
            0xD0, 0x11, // DRW v0, v1, 1
            // .sprite
            0b11110000,
            0b00000000,
        ]);

        vm.run_steps(6).unwrap();

        let pixels = vm.screen().pixels();
        assert!(pixels[..8].iter().all(|px| *px));
        assert!(!pixels[8]);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_flag_written_before_result() {
        // v15 := 0xFF; v1 := 1; ADD vF, v1
        let mut vm = vm_with(&[0x6F, 0xFF, 0x61, 0x01, 0x8F, 0x14]);
        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[0xF], 0x00);
    }

    #[test]
    fn test_draw_wraps_once() {
        // Sprite row 0b11000000 at x = 63 draws cells 63 and 64.
        // Only coordinates past the bound are wrapped, so x = 64
        // lands on the first column of the next row.
        let mut vm = vm_with(&[0xA2, 0x08, 0x60, 0x3F, 0xD0, 0x11, 0x00, 0x00, 0b11000000]);
        vm.run_steps(3).unwrap();

        assert!(vm.screen().pixel(63, 0));
        assert!(vm.screen().pixel(0, 1));
        assert!(!vm.screen().pixel(0, 0));

        // x = 65 wraps around to column 1.
        assert_eq!(wrap(65, DISPLAY_WIDTH), 1);
        assert_eq!(wrap(DISPLAY_WIDTH, DISPLAY_WIDTH), DISPLAY_WIDTH);
    }

    #[test]
    fn test_faults_halt_the_machine() {
        let mut vm = vm_with(&[0x00, 0xEE]);
        let err = Chip8Error::StackUnderflow { address: 0x200 };

        assert_eq!(vm.step(), Err(err.clone()));
        assert_eq!(vm.fault(), Some(&err));
        assert_eq!(vm.cycle(), Err(err.clone()));
        assert_eq!(vm.step(), Err(err));

        // Loading a program clears the fault.
        vm.load_bytecode(&[0x60, 0x01]).unwrap();
        assert_eq!(vm.step(), Ok(Flow::Ok));
    }

    #[test]
    fn test_dump_ram() {
        let vm = vm_with(&[0x60, 0x0A, 0x61, 0x05]);
        assert_eq!(vm.dump_ram(4).unwrap(), "0200: 600A\n0202: 6105\n");
    }
}
