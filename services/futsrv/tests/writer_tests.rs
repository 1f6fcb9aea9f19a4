//! Single-field and bulk write dispatch

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use support::{ScriptedTransport, TEST_BACKOFF};
use futsrv::address_map::{AddressMap, RegisterKind};
use futsrv::connection::DeviceConnection;
use futsrv::error::FutSrvError;
use futsrv::reader::RangeReader;
use futsrv::writer::WriteDispatcher;

/// Writable registers inside the default holding ranges: 18 settings plus
/// six fields for each of the eight external sensors
const WRITABLE_IN_RANGES: usize = 18 + 6 * 8;

fn dispatcher(transport: &ScriptedTransport) -> WriteDispatcher {
    let connection = DeviceConnection::new(Box::new(transport.clone()));
    let reader = RangeReader::new(connection.clone(), 125, TEST_BACKOFF).unwrap();
    WriteDispatcher::new(Arc::new(AddressMap::futura().unwrap()), connection, reader)
}

fn overrides(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[tokio::test]
async fn test_single_write_encodes_scaled_value() {
    let transport = ScriptedTransport::new();
    let writer = dispatcher(&transport);

    let receipt = writer.write_field("CfgTempSet", 21.5).await.unwrap();

    assert_eq!(receipt.address, 10);
    assert_eq!(receipt.encoded, 215);
    assert_eq!(transport.writes(), vec![(10, 215)]);
    // No confirmation read
    assert!(transport.reads().is_empty());
}

#[tokio::test]
async fn test_single_write_negative_correction() {
    let transport = ScriptedTransport::new();
    let writer = dispatcher(&transport);

    writer.write_field("ExtSensTempCorr1", -1.5).await.unwrap();
    writer.write_field("ExtSensTemp3", 22.0).await.unwrap();

    assert_eq!(transport.writes(), vec![(115, 0xFFF1), (322, 220)]);
}

#[tokio::test]
async fn test_single_write_out_of_range_issues_no_request() {
    let transport = ScriptedTransport::new();
    let writer = dispatcher(&transport);

    let err = writer.write_field("CfgTempSet", 10_000.0).await.unwrap_err();

    assert!(matches!(err, FutSrvError::OutOfRange { scaled: 100_000, .. }));
    assert!(transport.writes().is_empty());
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_single_write_rejects_unknown_and_read_only() {
    let transport = ScriptedTransport::new();
    let writer = dispatcher(&transport);

    for name in ["NoSuchField", "FuncAwayBegin", "TempIndoor", "ExtSensTemp9"] {
        let err = writer.write_field(name, 1.0).await.unwrap_err();
        assert!(
            matches!(err, FutSrvError::UnknownOrNotWritable(ref n) if n == name),
            "{name}: {err}"
        );
    }
    assert!(transport.writes().is_empty());
}

#[tokio::test]
async fn test_single_write_failure_reports_address() {
    let transport = ScriptedTransport::new();
    transport.break_write(10);
    let writer = dispatcher(&transport);

    let err = writer.write_field("CfgTempSet", 20.0).await.unwrap_err();

    assert!(matches!(err, FutSrvError::WriteFailed { address: 10, .. }));
}

#[tokio::test]
async fn test_bulk_update_writes_in_address_order() {
    let transport = ScriptedTransport::new();
    transport.set(RegisterKind::Holding, 11, 450);
    let writer = dispatcher(&transport);

    let report = writer
        .bulk_update(&overrides(&[
            ("CfgTempSet", 22.0),
            ("FuncBoostTm", 600.0),
            ("Bogus", 1.0),
        ]))
        .await
        .unwrap();

    assert_eq!(report.ignored, vec!["Bogus".to_string()]);
    assert_eq!(report.applied, vec!["CfgTempSet".to_string(), "FuncBoostTm".to_string()]);
    assert_eq!(report.written.len(), WRITABLE_IN_RANGES);

    let writes = transport.writes();
    assert_eq!(writes.len(), WRITABLE_IN_RANGES);
    assert!(writes.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(writes.contains(&(10, 220)));
    assert!(writes.contains(&(1, 600)));
    // Unchanged registers are written back as read
    assert!(writes.contains(&(11, 450)));
    // Read-only and unread registers are left alone
    assert!(writes.iter().all(|(addr, _)| *addr != 6 && *addr != 115));
}

#[tokio::test]
async fn test_bulk_update_writes_overridden_register_outside_ranges() {
    let transport = ScriptedTransport::new();
    let writer = dispatcher(&transport);

    let report = writer
        .bulk_update(&overrides(&[("ExtSensTempCorr2", -0.5), ("CfgHumiSet", 50.0)]))
        .await
        .unwrap();

    assert_eq!(report.written.len(), WRITABLE_IN_RANGES + 1);
    assert!(transport.writes().contains(&(120, 0xFFFB)));
}

#[tokio::test]
async fn test_bulk_update_stops_at_first_failure() {
    let transport = ScriptedTransport::new();
    transport.break_write(12);
    let writer = dispatcher(&transport);

    let err = writer
        .bulk_update(&overrides(&[("CfgTempSet", 21.0), ("FuncTimeProg", 1.0)]))
        .await
        .unwrap_err();

    assert!(matches!(err, FutSrvError::WriteFailed { address: 12, .. }));
    let written: Vec<u16> = transport.writes().into_iter().map(|(a, _)| a).collect();
    // Earlier writes stay applied
    assert_eq!(written, vec![0, 1, 2, 3, 4, 5, 10, 11]);
    assert_eq!(transport.holding(10), Some(210));
}

#[tokio::test]
async fn test_bulk_update_out_of_range_writes_nothing() {
    let transport = ScriptedTransport::new();
    let writer = dispatcher(&transport);

    let err = writer
        .bulk_update(&overrides(&[("CfgTempSet", 21.0), ("CfgHumiSet", -4000.0)]))
        .await
        .unwrap_err();

    assert!(matches!(err, FutSrvError::OutOfRange { .. }));
    assert!(transport.writes().is_empty());
}

#[tokio::test]
async fn test_bulk_update_without_writable_fields_is_noop() {
    let transport = ScriptedTransport::new();
    let writer = dispatcher(&transport);

    let report = writer
        .bulk_update(&overrides(&[("TempIndoor", 20.0), ("Nope", 1.0)]))
        .await
        .unwrap();

    assert!(report.written.is_empty());
    assert_eq!(report.ignored.len(), 2);
    assert!(transport.reads().is_empty());
    assert!(transport.writes().is_empty());
}
