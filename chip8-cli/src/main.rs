//! Entrypoint for CLI
mod error;
mod keymap;

use std::{env, error::Error, fs, io::Write, time::Instant};

use chip8::{prelude::*, IMPL_VERSION};
use log::{error, info, warn};

use self::{error::AppError, keymap::KeyMap};

static USAGE: &str = r#"
usage: chip8 run FILE [OPTIONS]

options:
    --frames N      Number of frames to run before printing the screen (default 600)
    --speed N       Instructions executed per frame (default 10)
    --keys KEYS     Keys to type, one per frame, by default on the QWERTY layout
                        1 2 3 4
                        Q W E R
                        A S D F
                        Z X C V
    --keymap FILE   YAML file mapping typed keys to the keypad
    --config FILE   YAML file with VM configuration

examples:
    chip8 run breakout.rom
    chip8 run breakout.rom --frames 120 --keys qqqeee
"#;

const DEFAULT_FRAMES: u64 = 600;

/// Terminal bell, rung when the tone starts.
#[derive(Default)]
struct Bell {
    playing: bool,
}

impl Tone for Bell {
    fn start(&mut self, frequency: Hz) {
        if !self.playing {
            info!("tone on at {}Hz", frequency.0);
            self.playing = true;

            // Best effort, a missing bell must not stop the machine.
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(b"\x07").and_then(|_| stderr.flush());
        }
    }

    fn stop(&mut self) {
        if self.playing {
            info!("tone off");
            self.playing = false;
        }
    }
}

fn load_config(filepath: &str) -> Result<Chip8Conf, AppError> {
    let file = fs::File::open(filepath)?;
    let conf: Chip8Conf = serde_yaml::from_reader(file)?;
    log::debug!("loaded config: {conf:#?}");
    Ok(conf)
}

fn run_bytecode(opts: RunOpts) -> Result<(), AppError> {
    let mut conf = match &opts.config {
        Some(filepath) => load_config(filepath)?,
        None => Chip8Conf::default(),
    };
    if let Some(speed) = opts.speed {
        conf.speed = speed;
    }

    let keymap = match &opts.keymap {
        Some(filepath) => KeyMap::from_file(filepath)?,
        None => KeyMap::qwerty(),
    };

    let bytecode = fs::read(&opts.filepath)?;

    let mut clock = Clock::new(conf.frame_rate);
    let mut vm = Chip8Vm::with_devices(conf, FrameBuffer::new(), Keypad::new(), Bell::default());
    vm.load_bytecode(bytecode.as_slice())?;

    log::debug!("program:\n{}", vm.dump_ram(bytecode.len() + 1)?);

    let mut keys = opts.keys.chars().filter_map(|c| {
        let key = keymap.map_key(c);
        if key.is_none() {
            warn!("no keypad mapping for {c:?}");
        }
        key
    });
    let mut held: Option<KeyCode> = None;

    let start = Instant::now();
    clock.reset();

    for _ in 0..opts.frames {
        clock.wait();

        // Each typed key is held down for a single frame.
        if let Some(key) = held.take() {
            vm.keyboard_mut().key_up(key);
        }
        if let Some(key) = keys.next() {
            vm.keyboard_mut().key_down(key);
            held = Some(key);
        }

        let s = vm.keyboard().dump()?;
        if !s.is_empty() {
            log::debug!("{s}");
        }

        if let Err(err) = vm.cycle() {
            if err.is_fault() {
                // Show what the program drew before it halted.
                println!("{}", vm.screen().dump()?);
                log::debug!("pc: {:03X} registers: {:02X?}", vm.pc(), vm.registers());
            }
            return Err(err.into());
        }
    }

    info!(
        "ran {} frames in {}ms",
        opts.frames,
        start.elapsed().as_nanos() as f64 / 1000000.0
    ); // to millis
    if vm.is_paused() {
        info!("program is waiting for a key press");
    }

    println!("{}", vm.screen().dump()?);

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    simple_logger::SimpleLogger::new().env().init()?;

    match parse_args(env::args().skip(1)) {
        Some(Cmd::Run(opts)) => {
            if let Err(err) = run_bytecode(opts) {
                error!("{err}");
                std::process::exit(1);
            }
        }
        None => {
            print_usage();
            // FreeBSD EX_USAGE (64)
            std::process::exit(64)
        }
    }

    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Option<Cmd> {
    match args.next()?.as_str() {
        "run" => {
            let mut opts = RunOpts {
                filepath: args.next()?,
                frames: DEFAULT_FRAMES,
                speed: None,
                keys: String::new(),
                config: None,
                keymap: None,
            };

            while let Some(flag) = args.next() {
                match flag.as_str() {
                    "--frames" => opts.frames = args.next()?.parse().ok()?,
                    "--speed" => opts.speed = Some(args.next()?.parse().ok()?),
                    "--keys" => opts.keys = args.next()?,
                    "--config" => opts.config = Some(args.next()?),
                    "--keymap" => opts.keymap = Some(args.next()?),
                    _ => {
                        warn!("unknown option {flag}");
                        return None;
                    }
                }
            }

            Some(Cmd::Run(opts))
        }
        _ => None,
    }
}

fn print_usage() {
    println!("Chip8 v{IMPL_VERSION}");
    println!("{USAGE}");
}

#[derive(Debug, PartialEq, Eq)]
enum Cmd {
    /// Run file
    Run(RunOpts),
}

#[derive(Debug, PartialEq, Eq)]
struct RunOpts {
    filepath: String,
    frames: u64,
    speed: Option<usize>,
    keys: String,
    config: Option<String>,
    keymap: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(line: &str) -> impl Iterator<Item = String> + '_ {
        line.split_whitespace().map(String::from)
    }

    #[test]
    fn test_parse_run() {
        assert_eq!(
            parse_args(args("run pong.rom --speed 20 --keys qwe --frames 5 --keymap vi.yaml")),
            Some(Cmd::Run(RunOpts {
                filepath: "pong.rom".into(),
                frames: 5,
                speed: Some(20),
                keys: "qwe".into(),
                config: None,
                keymap: Some("vi.yaml".into()),
            }))
        );
    }

    #[test]
    fn test_parse_defaults() {
        let Some(Cmd::Run(opts)) = parse_args(args("run pong.rom")) else {
            panic!("expected run command");
        };
        assert_eq!(opts.frames, DEFAULT_FRAMES);
        assert_eq!(opts.speed, None);
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(parse_args(args("")), None);
        assert_eq!(parse_args(args("run")), None);
        assert_eq!(parse_args(args("asm pong.asm")), None);
        assert_eq!(parse_args(args("run pong.rom --speed fast")), None);
        assert_eq!(parse_args(args("run pong.rom --frames")), None);
        assert_eq!(parse_args(args("run pong.rom --turbo")), None);
    }

    #[test]
    fn test_config_yaml() {
        let conf: Chip8Conf = serde_yaml::from_str("speed: 20\ntone_frequency: 880\nseed: 7\n").unwrap();
        assert_eq!(conf.speed, 20);
        assert_eq!(conf.tone_frequency, Hz(880));
        assert_eq!(conf.frame_rate, Hz(60));
        assert_eq!(conf.seed, Some(7));
    }

    #[test]
    fn test_bell_is_idempotent() {
        let mut bell = Bell::default();
        bell.start(Hz(440));
        bell.start(Hz(440));
        assert!(bell.playing);
        bell.stop();
        bell.stop();
        assert!(!bell.playing);
    }
}
