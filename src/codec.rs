//! The stage contract shared by every transform in a pipeline.

use tracing::{debug, warn};

use crate::error::CodecError;
use crate::payload::Payload;

/// What part a stage plays in a pipeline. Placement rules are checked
/// against this at assembly time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    /// The tokenizing codec. Must run first outbound, last inbound.
    Tokenizer,
    /// Any later reversible transform (compression, framing).
    Transform,
}

/// A reversible transform over a batch of payloads.
///
/// Both directions are total over well-formed input: the result has exactly
/// one payload per input, in input order. Any failure aborts the whole batch
/// and no partial list is returned.
pub trait PayloadCodec: Send + Sync {
    /// Short name used in logs and pipeline errors.
    fn name(&self) -> &'static str;

    /// The stage's role in a pipeline.
    fn role(&self) -> StageRole {
        StageRole::Transform
    }

    /// Outbound transform.
    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError>;

    /// Inbound transform. Payloads this stage did not produce pass through.
    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError>;
}

/// Apply `f` to each payload in order, aborting the batch on the first error.
pub(crate) fn map_batch<T, F>(
    stage: &'static str,
    direction: &'static str,
    items: Vec<T>,
    mut f: F,
) -> Result<Vec<Payload>, CodecError>
where
    F: FnMut(T) -> Result<Payload, CodecError>,
{
    debug!(stage, direction, items = items.len(), "Processing batch");
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match f(item) {
            Ok(payload) => out.push(payload),
            Err(err) => {
                warn!(stage, direction, index, kind = ?err.kind(), "Batch aborted");
                return Err(err);
            }
        }
    }
    Ok(out)
}
