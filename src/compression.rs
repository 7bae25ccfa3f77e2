//! Zlib compression stage.
//!
//! Compresses the whole framed payload (metadata included), so markers set
//! by earlier stages survive the round trip. In a pipeline this stage always
//! runs after the tokenizer, which means it only ever sees token ciphertext.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::codec::{map_batch, PayloadCodec};
use crate::error::CodecError;
use crate::payload::{Payload, ENCODING_ZLIB, MAX_FRAME_LEN, METADATA_ENCODING};

/// Compresses payload frames with zlib.
#[derive(Debug, Clone)]
pub struct ZlibCodec {
    always_encode: bool,
    level: Compression,
    max_decoded_len: usize,
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self {
            always_encode: true,
            level: Compression::default(),
            max_decoded_len: MAX_FRAME_LEN,
        }
    }
}

impl ZlibCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// When false, a payload whose compressed form is not smaller is left
    /// as it was.
    pub fn always_encode(mut self, always: bool) -> Self {
        self.always_encode = always;
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Refuse inbound streams that inflate past `limit` bytes. Never above
    /// the frame cap.
    pub fn max_decoded_len(mut self, limit: usize) -> Self {
        self.max_decoded_len = limit.min(MAX_FRAME_LEN);
        self
    }

    fn encode_one(&self, payload: Payload) -> Result<Payload, CodecError> {
        let frame = payload.to_frame()?;

        let mut encoder = ZlibEncoder::new(Vec::with_capacity(frame.len() / 2), self.level);
        encoder.write_all(&frame)?;
        let compressed = encoder.finish()?;

        if !self.always_encode && compressed.len() >= frame.len() {
            return Ok(payload);
        }
        Ok(Payload::new(compressed).with_metadata(METADATA_ENCODING, ENCODING_ZLIB))
    }

    fn decode_one(&self, payload: Payload) -> Result<Payload, CodecError> {
        if !payload.has_encoding(ENCODING_ZLIB) {
            return Ok(payload);
        }

        // Inflate at most one byte past the limit, so oversized streams are
        // detected without being fully expanded.
        let limit = self.max_decoded_len as u64 + 1;
        let mut frame = Vec::new();
        ZlibDecoder::new(payload.data.as_slice())
            .take(limit)
            .read_to_end(&mut frame)?;
        if frame.len() > self.max_decoded_len {
            return Err(CodecError::MalformedFrame);
        }
        Payload::from_frame(&frame)
    }
}

impl PayloadCodec for ZlibCodec {
    fn name(&self) -> &'static str {
        "zlib"
    }

    fn encode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_batch(self.name(), "encode", payloads, |p| self.encode_one(p))
    }

    fn decode(&self, payloads: Vec<Payload>) -> Result<Vec<Payload>, CodecError> {
        map_batch(self.name(), "decode", payloads, |p| self.decode_one(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{ENCODING_PROTECTED, METADATA_KEY_ID};

    #[test]
    fn test_roundtrip_keeps_inner_metadata() {
        let codec = ZlibCodec::new();
        let inner = Payload::new(vec![42u8; 512])
            .with_metadata(METADATA_ENCODING, ENCODING_PROTECTED)
            .with_metadata(METADATA_KEY_ID, "k1");

        let encoded = codec.encode(vec![inner.clone()]).unwrap();
        assert!(encoded[0].has_encoding(ENCODING_ZLIB));
        assert!(encoded[0].data.len() < 512);

        assert_eq!(codec.decode(encoded).unwrap(), vec![inner]);
    }

    #[test]
    fn test_incompressible_payload_left_alone_when_optional() {
        let codec = ZlibCodec::new().always_encode(false);
        let tiny = Payload::new(vec![1u8]);

        let encoded = codec.encode(vec![tiny.clone()]).unwrap();
        assert_eq!(encoded, vec![tiny]);
    }

    #[test]
    fn test_unmarked_payload_passes_through_decode() {
        let codec = ZlibCodec::new();
        let plain = Payload::new(b"{}".to_vec()).with_metadata("encoding", "json/plain");
        assert_eq!(codec.decode(vec![plain.clone()]).unwrap(), vec![plain]);
    }

    #[test]
    fn test_inflation_past_limit_rejected() {
        // 1 MiB of zeros compresses to about a kilobyte.
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0u8; 1024 * 1024]).unwrap();
        let bomb = Payload::new(encoder.finish().unwrap())
            .with_metadata(METADATA_ENCODING, ENCODING_ZLIB);
        assert!(bomb.data.len() < 8 * 1024);

        let codec = ZlibCodec::new().max_decoded_len(64 * 1024);
        assert!(matches!(codec.decode(vec![bomb]), Err(CodecError::MalformedFrame)));
    }

    #[test]
    fn test_limit_clamped_to_frame_cap() {
        assert_eq!(ZlibCodec::new().max_decoded_len, MAX_FRAME_LEN);
        assert_eq!(ZlibCodec::new().max_decoded_len(usize::MAX).max_decoded_len, MAX_FRAME_LEN);
    }

    #[test]
    fn test_level_clamped_and_roundtrips() {
        let codec = ZlibCodec::new().level(42);
        assert_eq!(codec.level.level(), 9);

        let inner = Payload::new(vec![7u8; 256]).with_metadata("k", "v");
        let encoded = codec.encode(vec![inner.clone()]).unwrap();
        assert_eq!(ZlibCodec::new().level(0).decode(encoded).unwrap(), vec![inner]);
    }

    #[test]
    fn test_corrupt_stream_is_transform_error() {
        let codec = ZlibCodec::new();
        let bogus = Payload::new(vec![0xde, 0xad, 0xbe, 0xef])
            .with_metadata(METADATA_ENCODING, ENCODING_ZLIB);

        let err = codec.decode(vec![bogus]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Transform);
    }
}
