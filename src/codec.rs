//! Notification wire codec.
//!
//! Serializes notification batches to the flat JSON array broadcast to
//! every server. Decoding is fail-closed: a payload that does not parse
//! rejects the whole batch before any side effect. Action bits are not
//! validated here — unknown combinations decode and are handled (or
//! rejected) downstream.

use thiserror::Error;

use crate::actions::{ActionSet, MediaChange};

/// Wire codec failure.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed notification payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
    #[error("failed to encode notification batch: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Encoder/decoder for the broadcast payload.
///
/// The payload is a flat array of `{"Id", "Action"}` records with no
/// envelope metadata; `decode(encode(batch)) == batch` for any batch,
/// including the empty one.
pub struct NotificationCodec;

impl NotificationCodec {
    /// Encode a content notification batch.
    pub fn encode(batch: &[ActionSet]) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(batch).map_err(CodecError::Encode)
    }

    /// Decode a content notification batch.
    pub fn decode(payload: &[u8]) -> Result<Vec<ActionSet>, CodecError> {
        serde_json::from_slice(payload).map_err(CodecError::MalformedPayload)
    }

    /// Encode a media operation batch (`{"Id", "Operation"}` records).
    pub fn encode_media(batch: &[MediaChange]) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(batch).map_err(CodecError::Encode)
    }

    /// Decode a media operation batch.
    pub fn decode_media(payload: &[u8]) -> Result<Vec<MediaChange>, CodecError> {
        serde_json::from_slice(payload).map_err(CodecError::MalformedPayload)
    }
}
