//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from a clean or empty WAL
//! - Recovery with partial writes (torn tail)
//! - Recovery with corrupted entries (CRC mismatch)
//! - Verify mode (stats only, file untouched)

use std::fs::{self, File, OpenOptions};
use std::io::Write;

use pagegrid::config::WalSyncStrategy;
use pagegrid::wal::{WalEntry, WalRecovery, WalWriter, HEADER_SIZE};

use crate::common::{post_op, setup_temp_wal, write_raw_entries};

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        for i in 0..20 {
            writer.append(post_op(i)).unwrap();
        }
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 20);
    assert_eq!(result.entries_recovered, 20);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 20);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_truncates_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    let good = vec![WalEntry::new(1, post_op(1)), WalEntry::new(2, post_op(2))];
    write_raw_entries(&wal_path, &good);
    let good_len = fs::metadata(&wal_path).unwrap().len();

    let partial = WalEntry::new(3, post_op(3)).serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&partial[..HEADER_SIZE + 2]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries, good);
    assert_eq!(result.entries_corrupted, 0);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), good_len);

    // Writer opens cleanly afterwards and continues the sequence
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.append(post_op(9)).unwrap(), 3);
}

#[test]
fn test_recover_stops_at_crc_mismatch() {
    let (_temp, wal_path) = setup_temp_wal();
    let entries: Vec<_> = (1..=3).map(|lsn| WalEntry::new(lsn, post_op(lsn))).collect();
    write_raw_entries(&wal_path, &entries);

    // Flip the last byte of the second entry's data
    let first_len = entries[0].serialize().unwrap().len();
    let second_len = entries[1].serialize().unwrap().len();
    let mut bytes = fs::read(&wal_path).unwrap();
    bytes[first_len + second_len - 1] ^= 0xFF;
    fs::write(&wal_path, bytes).unwrap();

    let (recovered, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), first_len as u64);
}

#[test]
fn test_verify_does_not_modify() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw_entries(&wal_path, &[WalEntry::new(1, post_op(1))]);
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0xAB; 7]).unwrap();
    drop(file);
    let before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();
    assert_eq!(result.entries_recovered, 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), before);
}
