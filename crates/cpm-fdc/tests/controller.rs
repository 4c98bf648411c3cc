//! The controller driven through the threaded backend, the way the machine
//! uses it: submit, then poll until pending is zero.

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use cpm_fdc::{
    DiskController, DiskStatus, DriveGeometry, FileStore, MemoryStore, SectorIo, WorkerIo,
    formatted_sector,
};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cpm-fdc-ctl-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn drain<I: SectorIo>(controller: &mut DiskController<I>, memory: &mut [u8]) {
    for _ in 0..10_000 {
        controller.poll(memory);
        if controller.is_idle() {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("controller never went idle ({} pending)", controller.pending());
}

fn small(drive: u8) -> DriveGeometry {
    DriveGeometry {
        drive,
        tracks: 4,
        sectors: 8,
        name: String::new(),
    }
}

#[test]
fn format_then_read_back_on_worker() {
    let mut controller =
        DiskController::with_geometries(WorkerIo::spawn(MemoryStore::new()), vec![small(0)]);
    let mut memory = vec![0u8; 0x10000];

    controller.format_drive(0).expect("format");
    assert!(controller.pending() > 0);
    drain(&mut controller, &mut memory);
    assert_eq!(controller.write_complete(), Some(true));

    controller.set_track(3);
    controller.set_sector(8);
    controller.set_dma(0x8000);
    controller.command(0, &memory);
    drain(&mut controller, &mut memory);
    assert_eq!(controller.status(), DiskStatus::Ok);
    assert_eq!(&memory[0x8000..0x8080], &formatted_sector()[..]);
}

#[test]
fn unwritten_sector_on_worker_reports_failure() {
    let mut controller = DiskController::new(WorkerIo::spawn(MemoryStore::new()));
    let mut memory = vec![0x77u8; 0x10000];
    controller.set_sector(1);
    controller.command(0, &memory);
    drain(&mut controller, &mut memory);
    assert_eq!(controller.status().code(), 8);
    assert!(memory.iter().all(|&b| b == 0x77));
}

#[test]
fn file_store_survives_controller_restart() {
    let dir = scratch("restart");
    let mut memory = vec![0u8; 0x10000];
    let image: Vec<u8> = (0..4 * 8 * 128).map(|i| (i % 251) as u8).collect();
    {
        let store = FileStore::open(&dir).expect("open");
        let mut controller =
            DiskController::with_geometries(WorkerIo::spawn(store), vec![small(1)]);
        controller.load_image(1, "work.dsk", &image).expect("load");
        drain(&mut controller, &mut memory);
        assert_eq!(controller.write_complete(), Some(true));
    }

    // Fresh controller with default shapes picks the saved one up.
    let store = FileStore::open(&dir).expect("reopen");
    let mut controller = DiskController::new(WorkerIo::spawn(store));
    controller.restore_geometries();
    drain(&mut controller, &mut memory);
    let geometry = controller.geometry(1).expect("drive 1").clone();
    assert_eq!((geometry.tracks, geometry.sectors), (4, 8));
    assert_eq!(geometry.name, "work.dsk");

    controller.dump_drive(1).expect("dump");
    drain(&mut controller, &mut memory);
    let dump = controller.take_dump().expect("dump ready");
    assert_eq!(dump.image.expect("full drive"), image);

    let _ = fs::remove_dir_all(&dir);
}
