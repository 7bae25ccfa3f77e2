//! The payload data model.
//!
//! A payload is an opaque byte buffer plus string-keyed metadata. Two
//! metadata keys are reserved: [`METADATA_ENCODING`] names the transform that
//! produced the current byte form, and [`METADATA_KEY_ID`] names the key that
//! protected it.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CodecError;

/// Metadata key naming the encoding of a payload's bytes.
pub const METADATA_ENCODING: &str = "encoding";

/// Metadata key naming the key id that protected a payload.
pub const METADATA_KEY_ID: &str = "encryption-key-id";

/// Encoding marker for tokenized, encrypted payloads.
pub const ENCODING_PROTECTED: &str = "binary/encrypted";

/// Encoding marker for plain structured (JSON) payloads.
pub const ENCODING_JSON: &str = "json/plain";

/// Encoding marker for zlib-compressed payload frames.
pub const ENCODING_ZLIB: &str = "binary/zlib";

/// Upper bound on the size of a whole frame, and so on any field inside it.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// A serialized value crossing a process boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Metadata; keys are unique and ordering carries no meaning.
    pub metadata: BTreeMap<String, Vec<u8>>,
    /// The payload bytes.
    pub data: Vec<u8>,
}

impl Payload {
    /// A payload with the given bytes and no metadata.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata: BTreeMap::new(),
            data: data.into(),
        }
    }

    /// Serialize `value` as JSON and tag it with the plain encoding.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, CodecError> {
        Ok(Self::new(serde_json::to_vec(value)?).with_metadata(METADATA_ENCODING, ENCODING_JSON))
    }

    /// Builder-style metadata insert.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The encoding marker, if present.
    pub fn encoding(&self) -> Option<&[u8]> {
        self.metadata.get(METADATA_ENCODING).map(Vec::as_slice)
    }

    /// True if this payload carries `marker` as its encoding.
    pub fn has_encoding(&self, marker: &str) -> bool {
        self.encoding() == Some(marker.as_bytes())
    }

    /// True if this payload was produced by the tokenizing codec.
    pub fn is_protected(&self) -> bool {
        self.has_encoding(ENCODING_PROTECTED)
    }

    /// The key id that protected this payload, if present.
    pub fn key_id(&self) -> Option<&[u8]> {
        self.metadata.get(METADATA_KEY_ID).map(Vec::as_slice)
    }

    /// Parse the bytes as JSON.
    pub fn to_value(&self) -> Result<serde_json::Value, CodecError> {
        Ok(serde_json::from_slice(&self.data)?)
    }

    /// Encode the whole payload, metadata included, as one byte buffer.
    ///
    /// # Layout
    /// ```text
    /// [ entry count (u32 BE) ]
    /// repeated: [ key len (u32 BE) ][ key ][ value len (u32 BE) ][ value ]
    /// [ data len (u32 BE) ][ data ]
    /// ```
    /// Metadata is written in key order, so equal payloads frame identically.
    pub fn to_frame(&self) -> Result<Vec<u8>, CodecError> {
        let body: usize = self
            .metadata
            .iter()
            .map(|(k, v)| 8 + k.len() + v.len())
            .sum();
        let total = 8 + body + self.data.len();
        if total > MAX_FRAME_LEN {
            return Err(CodecError::MalformedFrame);
        }
        let mut out = Vec::with_capacity(total);

        put_len(&mut out, self.metadata.len())?;
        for (key, value) in &self.metadata {
            put_field(&mut out, key.as_bytes())?;
            put_field(&mut out, value)?;
        }
        put_field(&mut out, &self.data)?;
        Ok(out)
    }

    /// Decode a buffer produced by [`to_frame`](Self::to_frame).
    pub fn from_frame(frame: &[u8]) -> Result<Self, CodecError> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(CodecError::MalformedFrame);
        }
        let mut reader = FrameReader { buf: frame };
        let count = reader.read_len()?;

        let mut metadata = BTreeMap::new();
        for _ in 0..count {
            let key = String::from_utf8(reader.field()?.to_vec())
                .map_err(|_| CodecError::MalformedFrame)?;
            let value = reader.field()?.to_vec();
            if metadata.insert(key, value).is_some() {
                return Err(CodecError::MalformedFrame);
            }
        }
        let data = reader.field()?.to_vec();

        if !reader.buf.is_empty() {
            return Err(CodecError::MalformedFrame);
        }
        Ok(Self { metadata, data })
    }
}

fn put_len(out: &mut Vec<u8>, len: usize) -> Result<(), CodecError> {
    if len > MAX_FRAME_LEN {
        return Err(CodecError::MalformedFrame);
    }
    let len = u32::try_from(len).map_err(|_| CodecError::MalformedFrame)?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn put_field(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), CodecError> {
    put_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}

struct FrameReader<'a> {
    buf: &'a [u8],
}

impl<'a> FrameReader<'a> {
    fn read_len(&mut self) -> Result<usize, CodecError> {
        if self.buf.len() < 4 {
            return Err(CodecError::MalformedFrame);
        }
        let (head, rest) = self.buf.split_at(4);
        self.buf = rest;
        let raw = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
        if raw > MAX_FRAME_LEN {
            return Err(CodecError::MalformedFrame);
        }
        Ok(raw)
    }

    fn field(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_len()?;
        if self.buf.len() < len {
            return Err(CodecError::MalformedFrame);
        }
        let (field, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(field)
    }
}
