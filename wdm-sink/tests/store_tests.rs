mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use wdm_sink::{
    ClientBackend, DataSinkBackend, MemoryBackend, PropertyPathStore, SinkError, StoreConfig,
};
use wdm_types::{BigInt, DataVersion, PropertyValue, TraitDescriptor, ValueKind};

// ── Typed set / get ──────────────────────────────────────────────

#[test]
fn set_and_get_each_type() {
    let (_backend, client) = make_client();
    let sink = test_c_sink(&client);

    sink.set("/1", false).unwrap();
    sink.set("/2", 15i64).unwrap();
    sink.set("/3/1", 16u32).unwrap();
    sink.set("/3/2", 2.5f64).unwrap();
    sink.set("/4", "en-US").unwrap();
    sink.set("/5", vec![0xDEu8, 0xAD]).unwrap();
    sink.set_null("/6").unwrap();

    assert!(!sink.get_bool("/1").unwrap());
    assert_eq!(sink.get_signed("/2").unwrap(), 15);
    assert_eq!(sink.get_unsigned("/3/1").unwrap(), 16);
    assert_eq!(sink.get_double("/3/2").unwrap(), 2.5);
    assert_eq!(sink.get_string("/4").unwrap().as_deref(), Some("en-US"));
    assert_eq!(sink.get_bytes("/5").unwrap(), Some(vec![0xDE, 0xAD]));
    assert_eq!(sink.get_string("/6").unwrap(), None);
    assert_eq!(sink.get_bytes("/6").unwrap(), None);
}

#[test]
fn generic_get() {
    let (_backend, client) = make_client();
    let sink = test_c_sink(&client);
    sink.set("/2", 17i32).unwrap();

    assert_eq!(sink.get::<i32>("/2").unwrap(), 17);
    assert_eq!(sink.get::<u32>("/2").unwrap(), 17);
    assert_eq!(sink.get::<BigInt>("/2").unwrap(), BigInt::from(17));
}

#[test]
fn later_write_wins() {
    let (_backend, client) = make_client();
    let sink = locale_sink(&client);
    sink.set("/1", "en-US").unwrap();
    sink.set("/1", "fr-FR").unwrap();
    assert_eq!(sink.get_string("/1").unwrap().as_deref(), Some("fr-FR"));
}

#[test]
fn optional_values_write_null() {
    let (_backend, client) = make_client();
    let sink = locale_sink(&client);
    sink.set("/1", None::<String>).unwrap();
    assert_eq!(sink.get_string("/1").unwrap(), None);
}

// ── Signed / unsigned channel ───────────────────────────────────

#[test]
fn unsigned_all_ones_reads_signed_minus_one() {
    let (_backend, client) = make_client();
    let sink = test_c_sink(&client);
    sink.set("/2", 18_446_744_073_709_551_615u64).unwrap();
    assert_eq!(sink.get_signed("/2").unwrap(), -1);
    assert_eq!(sink.get_unsigned("/2").unwrap(), u64::MAX);
}

#[test]
fn signed_negative_reads_unsigned_bit_pattern() {
    let (_backend, client) = make_client();
    let sink = test_c_sink(&client);
    sink.set("/2", -2i64).unwrap();
    assert_eq!(sink.get_unsigned("/2").unwrap(), u64::MAX - 1);
}

#[test]
fn narrow_reads_truncate() {
    let (_backend, client) = make_client();
    let sink = test_c_sink(&client);
    sink.set("/2", 0x1_0000_0005i64).unwrap();
    assert_eq!(sink.get::<i32>("/2").unwrap(), 5);
}

#[test]
fn big_int_writes_truncate_to_64_bits() {
    let (_backend, client) = make_client();
    let sink = test_c_sink(&client);

    let big = (BigInt::from(1u8) << 64u32) + BigInt::from(42u8);
    sink.set_signed_big("/2", &big).unwrap();
    assert_eq!(sink.get_signed("/2").unwrap(), 42);

    sink.set_unsigned_big("/3", &BigInt::from(u64::MAX)).unwrap();
    assert_eq!(sink.get_big_int("/3").unwrap(), BigInt::from(-1));
}

#[test]
fn backend_sees_sign_flag() {
    let (backend, client) = make_client();
    let sink = test_c_sink(&client);
    let handle = sink.handle().unwrap();

    sink.set("/2", 7u8).unwrap();
    client_flush(&client);
    assert_eq!(
        backend.remote_value(handle, "/2").unwrap(),
        Some(PropertyValue::Unsigned(7))
    );
}

fn client_flush(client: &wdm_sink::WdmClient<MemoryBackend>) {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(client.flush_update())
        .unwrap();
}

// ── Backend errors surface ──────────────────────────────────────

#[test]
fn missing_path_is_reported() {
    let (_backend, client) = make_client();
    let sink = locale_sink(&client);
    assert_eq!(
        sink.get_string("/missing"),
        Err(SinkError::PathNotFound("/missing".into()))
    );
}

#[test]
fn type_mismatch_is_reported() {
    let (_backend, client) = make_client();
    let sink = locale_sink(&client);
    sink.set("/1", "en-US").unwrap();
    assert_eq!(
        sink.get_bool("/1"),
        Err(SinkError::TypeMismatch {
            path: "/1".into(),
            expected: ValueKind::Bool,
            found: ValueKind::String,
        })
    );
}

#[test]
fn empty_path_rejected_by_backend() {
    let (_backend, client) = make_client();
    let sink = locale_sink(&client);
    assert_eq!(sink.set("", 1i64), Err(SinkError::InvalidPath(String::new())));
}

#[test]
fn backend_errors_not_masked_by_lenient_policy() {
    let (_backend, client) = make_lenient_client();
    let sink = locale_sink(&client);
    assert!(matches!(sink.get_signed("/nope"), Err(SinkError::PathNotFound(_))));
}

// ── Clear & version ─────────────────────────────────────────────

#[test]
fn clear_discards_staged_writes() {
    let (backend, client) = make_client();
    let sink = locale_sink(&client);
    let handle = sink.handle().unwrap();

    sink.set("/1", "en-US").unwrap();
    assert_eq!(backend.staged_count(handle).unwrap(), 1);

    sink.clear().unwrap();
    assert_eq!(backend.staged_count(handle).unwrap(), 0);
    assert!(sink.get_string("/1").is_err());
    assert!(!sink.is_shut_down());
}

#[test]
fn clear_keeps_committed_values() {
    let (_backend, client) = make_client();
    let sink = locale_sink(&client);
    sink.set("/1", "en-US").unwrap();
    client_flush(&client);

    sink.set("/1", "de-DE").unwrap();
    sink.clear().unwrap();
    assert_eq!(sink.get_string("/1").unwrap().as_deref(), Some("en-US"));
}

#[test]
fn version_starts_at_zero() {
    let (_backend, client) = make_client();
    let sink = locale_sink(&client);
    assert_eq!(sink.version().unwrap(), DataVersion::ZERO);
}

#[test]
fn writes_do_not_bump_version_until_flushed() {
    let (_backend, client) = make_client();
    let sink = locale_sink(&client);
    sink.set("/1", "en-US").unwrap();
    assert_eq!(sink.version().unwrap(), DataVersion::ZERO);
    client_flush(&client);
    assert_eq!(sink.version().unwrap(), DataVersion::new(1));
}

// ── Standalone store ────────────────────────────────────────────

#[test]
fn standalone_store_binds_and_releases() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    let handle = backend
        .new_trait_instance(&TraitDescriptor::new(LOCALE_SETTINGS, 1))
        .unwrap();
    assert!(!backend.is_initialized(handle).unwrap());

    let sink_backend: Arc<dyn DataSinkBackend> = backend.clone();
    let mut sink = PropertyPathStore::new(sink_backend, handle, StoreConfig::default()).unwrap();
    assert!(backend.is_initialized(handle).unwrap());
    assert_eq!(sink.handle(), Some(handle));

    sink.set("/1", "en-GB").unwrap();
    sink.shutdown();
    assert_eq!(backend.instance_count(), 0);
}

#[test]
fn standalone_store_rejects_unknown_handle() {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    let handle = backend
        .new_trait_instance(&TraitDescriptor::new(LOCALE_SETTINGS, 1))
        .unwrap();
    backend.shutdown(handle).unwrap();

    let sink_backend: Arc<dyn DataSinkBackend> = backend;
    let err = PropertyPathStore::new(sink_backend, handle, StoreConfig::default()).unwrap_err();
    assert_eq!(err, SinkError::InvalidHandle(handle));
}
