//! `FileStore` against a scratch directory.

use std::fs;
use std::path::PathBuf;

use cpm_fdc::{DriveGeometry, FileStore, SectorKey, SectorStore};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cpm-fdc-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn sectors_persist_across_reopen() {
    let dir = scratch("persist");
    let key = SectorKey::new(1, 3, 7);
    {
        let mut store = FileStore::open(&dir).expect("open");
        assert!(store.get_sector(key).expect("get").is_none());
        store.put_sector(key, &[0x5A; 128]).expect("put");
    }
    let mut store = FileStore::open(&dir).expect("reopen");
    assert_eq!(store.get_sector(key).expect("get"), Some([0x5A; 128]));
    // A slot before the written one exists in the file but was never written.
    assert!(store.get_sector(SectorKey::new(1, 0, 1)).expect("get").is_none());
    // Other drives are untouched.
    assert!(store.get_sector(SectorKey::new(0, 3, 7)).expect("get").is_none());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn drive_listing_skips_holes() {
    let dir = scratch("listing");
    let mut store = FileStore::open(&dir).expect("open");
    store.put_sector(SectorKey::new(0, 1, 1), &[1; 128]).expect("put");
    store.put_sector(SectorKey::new(0, 0, 2), &[2; 128]).expect("put");
    let listed = store.sectors_for_drive(0).expect("list");
    assert_eq!(
        listed.iter().map(|(k, s)| (*k, s[0])).collect::<Vec<_>>(),
        vec![(SectorKey::new(0, 0, 2), 2), (SectorKey::new(0, 1, 1), 1)]
    );
    assert!(store.sectors_for_drive(3).expect("list").is_empty());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn manifest_round_trips_geometry() {
    let dir = scratch("manifest");
    let mut store = FileStore::open(&dir).expect("open");
    assert!(store.geometries().expect("empty").is_empty());
    let small = DriveGeometry {
        drive: 2,
        tracks: 40,
        sectors: 18,
        name: "work.dsk".into(),
    };
    store.put_geometry(&DriveGeometry::ibm_3740(0)).expect("put");
    store.put_geometry(&small).expect("put");
    store.put_geometry(&DriveGeometry::ibm_3740(0)).expect("put again");
    let mut reopened = FileStore::open(&dir).expect("reopen");
    assert_eq!(
        reopened.geometries().expect("list"),
        vec![DriveGeometry::ibm_3740(0), small]
    );
    let _ = fs::remove_dir_all(&dir);
}
