//! Whole-machine runs on the synchronous disk backend.

use cpm_fdc::{DriveGeometry, ImmediateIo, MemoryStore, formatted_sector};
use emu_core::{Observable, Value};
use emu_cpm::{
    BufferedConsole, BufferedPrinter, CpmConfig, CpmMachine, DecodePolicy, MachineError,
    SliceExit,
};
use zilog_z80::{CF, ZF};

type Machine = CpmMachine<ImmediateIo<MemoryStore>>;

const TRACKS: u8 = 2;
const SECTORS: u8 = 4;

fn config() -> CpmConfig {
    CpmConfig {
        drives: vec![DriveGeometry {
            drive: 0,
            tracks: TRACKS,
            sectors: SECTORS,
            name: "boot.dsk".into(),
        }],
        ..CpmConfig::default()
    }
}

fn machine(config: &CpmConfig) -> (Machine, BufferedConsole, BufferedPrinter) {
    let console = BufferedConsole::new();
    let printer = BufferedPrinter::new();
    let machine = CpmMachine::new(
        config,
        ImmediateIo::new(MemoryStore::new()),
        Box::new(console.clone()),
        Box::new(printer.clone()),
    );
    (machine, console, printer)
}

/// Image whose boot sector holds `program` and whose other sectors are
/// filled with 0x10 + their index.
fn image(program: &[u8]) -> Vec<u8> {
    let count = usize::from(TRACKS) * usize::from(SECTORS);
    let mut image = Vec::with_capacity(count * 128);
    for index in 0..count {
        let mut sector = [0x10 + index as u8; 128];
        if index == 0 {
            sector = [0; 128];
            sector[..program.len()].copy_from_slice(program);
        }
        image.extend_from_slice(&sector);
    }
    image
}

#[test]
fn boots_and_prints() {
    let program = [
        0x3E, b'O', 0xD3, 0x01, // LD A,'O' ; OUT (1),A
        0x3E, b'K', 0xD3, 0x01, // LD A,'K' ; OUT (1),A
        0x76, // HALT
    ];
    let (mut m, console, _) = machine(&config());
    m.mount_image(0, "boot.dsk", &image(&program)).expect("mount");
    m.boot(0).expect("boot");
    assert_eq!(m.cpu().pc(), 0);
    assert_eq!(m.cpu().sp(), 0xF000);

    assert_eq!(m.run_slice(), SliceExit::Halted);
    assert_eq!(console.take_output(), b"OK");
    assert_eq!(m.cpu().pc(), 9);
    // Stays halted.
    assert_eq!(m.run_slice(), SliceExit::Halted);
    assert_eq!(m.cpu().pc(), 9);
}

#[test]
fn guest_reads_a_sector_through_ports() {
    let program = [
        0x3E, 0x00, 0xD3, 0x0A, // drive 0
        0x3E, 0x01, 0xD3, 0x0B, // track 1
        0x3E, 0x02, 0xD3, 0x0C, // sector 2
        0x3E, 0x00, 0xD3, 0x0F, // DMA low
        0x3E, 0x80, 0xD3, 0x10, // DMA high
        0x3E, 0x00, 0xD3, 0x0D, // read
        0xDB, 0x0D, // wait: IN A,(0Dh)
        0x3C, // INC A
        0x20, 0xFB, // JR NZ,wait
        0xDB, 0x0E, // IN A,(0Eh)
        0x32, 0x00, 0x90, // LD (9000h),A
        0x76,
    ];
    let (mut m, _, _) = machine(&config());
    m.mount_image(0, "boot.dsk", &image(&program)).expect("mount");
    m.boot(0).expect("boot");
    assert_eq!(m.run_slice(), SliceExit::Halted);

    let memory = m.bus().memory();
    // Track 1 sector 2 is image sector 5.
    assert!(memory[0x8000..0x8080].iter().all(|&b| b == 0x15));
    assert_eq!(memory[0x9000], 0);
    assert_eq!(m.query("disk.status"), Some(Value::U8(0)));
    assert_eq!(m.query("disk.pending"), Some(Value::U64(0)));
}

#[test]
fn empty_console_yields_the_slice() {
    let program = [
        0xDB, 0x00, // loop: IN A,(0)
        0xB7, // OR A
        0x28, 0xFB, // JR Z,loop
        0xDB, 0x01, // IN A,(1)
        0xD3, 0x01, // OUT (1),A
        0x76,
    ];
    let (mut m, console, _) = machine(&config());
    m.bus_mut().load(0, &program);
    m.reset();

    assert_eq!(m.run_slice(), SliceExit::Idle);
    assert_eq!(m.bus().idle_polls(), 4);

    console.push_input(b"z");
    assert_eq!(m.run_slice(), SliceExit::Halted);
    assert_eq!(console.take_output(), b"z");
}

#[test]
fn busy_program_completes_the_slice() {
    // JR $ forever.
    let (mut m, _, _) = machine(&config());
    m.bus_mut().load(0, &[0x18, 0xFE]);
    m.reset();
    let before = m.cpu().cycles();
    assert_eq!(m.run_slice(), SliceExit::Completed);
    assert_eq!(m.cpu().cycles().since(before).get(), 640 * 12);
}

#[test]
fn decode_policy() {
    let program = [0xED, 0x77, 0x76];
    let (mut m, _, _) = machine(&config());
    m.bus_mut().load(0, &program);
    m.reset();
    match m.run_slice() {
        SliceExit::DecodeError(e) => {
            assert_eq!((e.opcode, e.address), (0x77, 0x0000));
        }
        other => panic!("expected decode error, got {other:?}"),
    }
    assert_eq!(m.cpu().pc(), 2);

    m.reset();
    m.set_decode_policy(DecodePolicy::Skip);
    assert_eq!(m.run_slice(), SliceExit::Halted);
    assert_eq!(m.cpu().pc(), 3);
}

#[test]
fn hex_program_runs_from_its_start() {
    let (mut m, _, _) = machine(&config());
    let load = m
        .load_hex(":070100003E05C603FE087670\n:00000001FF\n")
        .expect("valid HEX");
    assert_eq!((load.start, load.end, load.len), (0x0100, 0x0106, 7));
    assert_eq!(m.cpu().pc(), 0x0100);
    assert_eq!(m.run_slice(), SliceExit::Halted);
    let regs = &m.cpu().regs;
    assert_eq!(regs.a, 8);
    assert_ne!(regs.f & ZF, 0);
    assert_eq!(regs.f & CF, 0);
}

#[test]
fn bad_hex_leaves_memory_alone() {
    let (mut m, _, _) = machine(&config());
    let err = m
        .load_hex(":070100003E05C603FE087671\n")
        .expect_err("checksum");
    assert!(matches!(err, MachineError::Hex(_)));
    assert!(m.bus().memory().iter().all(|&b| b == 0));
    assert_eq!(m.cpu().pc(), 0);
}

#[test]
fn boot_from_blank_store_fails() {
    let (mut m, _, _) = machine(&config());
    match m.boot(0) {
        Err(MachineError::Boot { drive: 0, status }) => assert_eq!(status.code(), 8),
        other => panic!("expected boot failure, got {other:?}"),
    }
}

#[test]
fn format_then_dump() {
    let (mut m, _, _) = machine(&config());
    m.format_drive(0).expect("format");
    let image = m.dump_drive(0).expect("dump");
    assert_eq!(image.len(), usize::from(TRACKS) * usize::from(SECTORS) * 128);
    for sector in image.chunks_exact(128) {
        assert_eq!(sector, &formatted_sector()[..]);
    }
    assert_eq!(m.bus().disk.geometry(0).map(|g| g.name.as_str()), Some("dsk0.cpm"));
}

#[test]
fn wrong_size_image_is_rejected() {
    let (mut m, _, _) = machine(&config());
    assert!(matches!(
        m.mount_image(0, "short.dsk", &[0; 100]),
        Err(MachineError::Disk(_))
    ));
    assert_eq!(m.io_status().split_whitespace().nth(5), Some("iocnt:0"));
}
