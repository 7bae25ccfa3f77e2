//! Ordered transform chains.
//!
//! A pipeline applies its stages first to last on the way out and last to
//! first on the way in. The tokenizer must be the first stage, so every
//! later stage (compression in particular) operates on small, high-entropy
//! token ciphertext and never on the original content.
//!
//! ```text
//! encode: content ─▶ [tokenizer] ─▶ [zlib] ─▶ wire
//! decode: content ◀─ [tokenizer] ◀─ [zlib] ◀─ wire
//! ```
//!
//! Placement is checked when the chain is built, not left to call order.

use std::sync::Arc;

use tracing::debug;

use crate::audit::AuditTrail;
use crate::codec::{PayloadCodec, StageRole};
use crate::compression::ZlibCodec;
use crate::config::{CodecConfig, CodecContext};
use crate::error::CodecError;
use crate::keys::KeyResolver;
use crate::payload::Payload;
use crate::store::ContentStore;
use crate::tokenizer::TokenizingCodec;

/// A validated, ordered chain of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn PayloadCodec>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.name()))
            .finish()
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Stage names in outbound order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage's encode, first to last.
    pub fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        let count = payloads.len();
        let mut current = payloads;
        for stage in &self.stages {
            current = stage.encode(current)?;
            check_len(stage.name(), count, current.len())?;
        }
        debug!(stages = self.stages.len(), items = count, "Pipeline encoded");
        Ok(current)
    }

    /// Run every stage's decode, last to first.
    pub fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        let count = payloads.len();
        let mut current = payloads;
        for stage in self.stages.iter().rev() {
            current = stage.decode(current)?;
            check_len(stage.name(), count, current.len())?;
        }
        debug!(stages = self.stages.len(), items = count, "Pipeline decoded");
        Ok(current)
    }
}

fn check_len(stage: &str, expected: usize, actual: usize) -> Result<(), CodecError> {
    if expected != actual {
        return Err(CodecError::InvalidPipeline(format!(
            "stage {} returned {} payloads for {}",
            stage, actual, expected
        )));
    }
    Ok(())
}

/// Collects stages in outbound order and validates their placement.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn PayloadCodec>>,
}

impl PipelineBuilder {
    /// Append a stage after those already added.
    pub fn stage(mut self, stage: impl PayloadCodec + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append an already boxed stage.
    pub fn boxed_stage(mut self, stage: Box<dyn PayloadCodec>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Validate placement and produce the pipeline.
    ///
    /// Fails if the chain is empty, if the first stage is not the
    /// tokenizer, or if any other stage claims the tokenizer role.
    pub fn build(self) -> Result<Pipeline, CodecError> {
        let (first, rest) = self
            .stages
            .split_first()
            .ok_or_else(|| CodecError::InvalidPipeline("no stages".into()))?;

        if first.role() != StageRole::Tokenizer {
            return Err(CodecError::InvalidPipeline(format!(
                "first stage must be the tokenizer, found {}",
                first.name()
            )));
        }
        if let Some(extra) = rest.iter().find(|s| s.role() == StageRole::Tokenizer) {
            return Err(CodecError::InvalidPipeline(format!(
                "tokenizer stage {} may only appear first",
                extra.name()
            )));
        }

        Ok(Pipeline {
            stages: self.stages,
        })
    }
}

/// Builds pipelines from configuration.
///
/// Holds the default key id and store binding; [`assemble_with`] applies a
/// per-unit-of-work [`CodecContext`] on top of them.
///
/// [`assemble_with`]: Self::assemble_with
pub struct PipelineAssembler {
    config: CodecConfig,
    resolver: Arc<dyn KeyResolver>,
    store: Arc<dyn ContentStore>,
    audit: Option<Arc<AuditTrail>>,
}

impl PipelineAssembler {
    pub fn new(
        config: CodecConfig,
        resolver: Arc<dyn KeyResolver>,
        store: Arc<dyn ContentStore>,
    ) -> Result<Self, CodecError> {
        config.validate()?;
        Ok(Self {
            config,
            resolver,
            store,
            audit: None,
        })
    }

    pub fn with_audit(mut self, audit: Arc<AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Assemble with the configured defaults.
    pub fn assemble(&self) -> Result<Pipeline, CodecError> {
        self.assemble_with(&CodecContext::default())
    }

    /// Assemble with `ctx`'s overrides applied to the tokenizer.
    pub fn assemble_with(&self, ctx: &CodecContext) -> Result<Pipeline, CodecError> {
        let mut tokenizer = TokenizingCodec::from_config(
            &self.config,
            Arc::clone(&self.resolver),
            Arc::clone(&self.store),
        );
        if let Some(audit) = &self.audit {
            tokenizer = tokenizer.with_audit(Arc::clone(audit));
        }
        let tokenizer = tokenizer.with_context(ctx);

        let mut builder = Pipeline::builder().stage(tokenizer);
        if self.config.compress {
            builder = builder.stage(ZlibCodec::new().always_encode(self.config.always_compress));
        }
        builder.build()
    }
}
