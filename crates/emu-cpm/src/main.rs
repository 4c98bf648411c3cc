//! CP/M 2.2 on the terminal.
//!
//! Mounts an optional disk image, boots (or starts a HEX program), and runs
//! with stdin as the keyboard and stdout as the screen until the CPU halts.

use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use cpm_fdc::{FileStore, MemoryStore, WorkerIo};
use emu_cpm::{BufferedConsole, BufferedPrinter, CpmConfig, CpmMachine, DecodePolicy, SliceExit};

/// Wall-clock length of one slice.
const SLICE: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "emu-cpm")]
#[command(about = "Run CP/M 2.2 on an emulated Z80")]
struct Args {
    /// Disk image to write onto a drive before booting
    #[arg(long)]
    disk: Option<PathBuf>,

    /// Drive the image goes to
    #[arg(long, default_value_t = 0)]
    drive: u8,

    /// Intel HEX program to run instead of booting
    #[arg(long)]
    hex: Option<PathBuf>,

    /// Directory for persistent drives
    #[arg(long)]
    store: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Instructions per 10 ms slice
    #[arg(long)]
    instr: Option<u32>,

    /// Skip undecodable opcodes instead of halting
    #[arg(long)]
    skip_unknown: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("emu-cpm: {e}");
        process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<CpmConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => CpmConfig::load(path)?,
        None => CpmConfig::default(),
    };
    if let Some(instr) = args.instr {
        config.instructions_per_slice = instr;
    }
    if args.skip_unknown {
        config.decode_policy = DecodePolicy::Skip;
    }
    if args.store.is_some() {
        config.store.clone_from(&args.store);
    }
    config.validate()?;
    Ok(config)
}

/// Feed stdin into the console queue. CP/M wants CR for end of line.
fn spawn_keyboard(console: BufferedConsole, eof: Arc<AtomicBool>) {
    thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = [0u8; 256];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let keys: Vec<u8> = buf[..n]
                        .iter()
                        .map(|&b| if b == b'\n' { b'\r' } else { b })
                        .collect();
                    console.push_input(&keys);
                }
            }
        }
        eof.store(true, Ordering::Relaxed);
    });
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(args)?;
    let io = match &config.store {
        Some(dir) => WorkerIo::spawn(FileStore::open(dir)?),
        None => WorkerIo::spawn(MemoryStore::new()),
    };

    let console = BufferedConsole::new();
    let printer = BufferedPrinter::new();
    let mut machine = CpmMachine::new(
        &config,
        io,
        Box::new(console.clone()),
        Box::new(printer.clone()),
    );
    machine.restore_geometries()?;

    if let Some(path) = &args.disk {
        let image = fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        machine.mount_image(args.drive, &name, &image)?;
    }

    match &args.hex {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            machine.load_hex(&text)?;
        }
        None => machine.boot(config.boot_drive)?,
    }

    let eof = Arc::new(AtomicBool::new(false));
    spawn_keyboard(console.clone(), Arc::clone(&eof));

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let result = loop {
        let started = Instant::now();
        let exit = machine.run_slice();

        stdout.write_all(&console.take_output())?;
        stdout.flush()?;
        stderr.write_all(&printer.take())?;

        match exit {
            SliceExit::Completed => {}
            SliceExit::Idle => {
                if eof.load(Ordering::Relaxed) && console.pending_input() == 0 {
                    log::info!("input closed while waiting for a key");
                    break Ok(());
                }
            }
            SliceExit::Halted => break Ok(()),
            SliceExit::DecodeError(e) => break Err(e),
        }
        if let Some(rest) = SLICE.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    };

    println!("\r\nHALT\r\nPC={:04X}", machine.cpu().pc());
    log::debug!("{}", machine.io_status());
    result.map_err(Into::into)
}
