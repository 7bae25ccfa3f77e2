//! Minimal example: per-tenant tokenization with a directory-backed store.
//!
//! Run with: `cargo run --example tenant_tokens`
//!
//! - Content is written to `<tmp>/tokenvault_demo/codex-data/<token>.json`
//! - Only the encrypted token travels on the wire
//! - Every token issued or redeemed is appended to an audit file

use std::sync::Arc;

use serde_json::json;
use tokenvault::audit::{AuditTrail, FileAuditSink};
use tokenvault::{
    generate_key, CodecConfig, CodecContext, DerivedKeyResolver, DirectoryStore, Payload,
    PipelineAssembler,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = std::env::temp_dir().join("tokenvault_demo");
    let store = Arc::new(DirectoryStore::open(&root)?);
    let audit_path = root.join("tokens.jsonl");
    let trail = Arc::new(AuditTrail::new().with_sink(Box::new(FileAuditSink::new(&audit_path)?)));

    let assembler = PipelineAssembler::new(
        CodecConfig::new("default").with_compression(true),
        Arc::new(DerivedKeyResolver::new(generate_key()?)),
        store,
    )?
    .with_audit(trail);

    let tenant_a = assembler.assemble_with(&CodecContext::new().with_key_id("tenant-a"))?;
    let wire = tenant_a.encode(vec![Payload::json(&json!({
        "customer": "Alice",
        "email": "alice@example.com"
    }))?])?;
    println!("Wire payload: {} bytes", wire[0].data.len());

    let restored = tenant_a.decode(wire)?;
    println!("Restored: {}", restored[0].to_value()?);
    println!("Records under: {}", root.display());
    println!("Audit trail: {}", audit_path.display());

    Ok(())
}
