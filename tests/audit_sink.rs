//! Tests for the pluggable AuditSink functionality.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tokenvault::audit::{AuditRecord, AuditSink, AuditTrail, FileAuditSink, Operation};
use tokenvault::config::DEFAULT_COLLECTION;
use tokenvault::{
    generate_key, CodecConfig, MemoryStore, Payload, PipelineAssembler, StaticKeyResolver,
};

/// A test sink that collects records into a shared Vec.
struct SharedVecSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl AuditSink for SharedVecSink {
    fn append(&mut self, record: AuditRecord) {
        self.records.lock().unwrap().push(record);
    }
}

#[test]
fn test_sink_receives_tokenize_and_redeem_records() {
    let records = Arc::new(Mutex::new(Vec::new()));
    let trail = Arc::new(AuditTrail::new().with_sink(Box::new(SharedVecSink {
        records: Arc::clone(&records),
    })));

    let store = Arc::new(MemoryStore::new());
    let resolver = StaticKeyResolver::new().with_key("k1", generate_key().unwrap());
    let pipeline = PipelineAssembler::new(CodecConfig::new("k1"), Arc::new(resolver), store.clone())
        .unwrap()
        .with_audit(trail)
        .assemble()
        .unwrap();

    let wire = pipeline
        .encode(vec![Payload::json(&json!({"user": "alice"})).unwrap()])
        .unwrap();
    pipeline.decode(wire).unwrap();

    let collected = records.lock().unwrap();
    assert_eq!(collected.len(), 2);
    assert_eq!(collected[0].operation, Operation::Tokenized);
    assert_eq!(collected[1].operation, Operation::Redeemed);
    assert_eq!(collected[0].token, collected[1].token);
    assert_eq!(collected[0].key_id, "k1");
    assert_eq!(collected[0].collection, DEFAULT_COLLECTION);

    // The token in the trail is the store handle for the content.
    assert_eq!(store.ids(DEFAULT_COLLECTION), vec![collected[0].token.clone()]);
}

#[test]
fn test_file_sink_attached_to_trail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.jsonl");
    let trail = Arc::new(AuditTrail::new().with_sink(Box::new(FileAuditSink::new(&path).unwrap())));

    let resolver = StaticKeyResolver::new().with_key("k1", generate_key().unwrap());
    let pipeline = PipelineAssembler::new(
        CodecConfig::new("k1"),
        Arc::new(resolver),
        Arc::new(MemoryStore::new()),
    )
    .unwrap()
    .with_audit(trail)
    .assemble()
    .unwrap();

    pipeline
        .encode(vec![
            Payload::json(&json!({"a": 1})).unwrap(),
            Payload::json(&json!({"b": 2})).unwrap(),
        ])
        .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(!text.contains("\"a\""), "audit trail must not carry content");
}
