mod clock;
pub mod constants;
mod cpu;
mod devices;
mod error;
mod framebuffer;
mod keypad;
mod op;
mod vm;

pub use self::{
    clock::Clock,
    devices::{Buzzer, InvalidKeyCode, KeyCode, Keyboard, Screen, Tone},
    error::{Chip8Error, Chip8Result},
    framebuffer::FrameBuffer,
    keypad::Keypad,
    op::{Op, UnknownOpcode},
    vm::{Chip8Conf, Chip8Vm, Flow, Hz},
};

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        clock::Clock,
        devices::{Buzzer, KeyCode, Keyboard, Screen, Tone},
        error::{Chip8Error, Chip8Result},
        framebuffer::FrameBuffer,
        keypad::Keypad,
        vm::{Chip8Conf, Chip8Vm, Flow, Hz},
    };
}
