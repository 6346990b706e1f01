//! Wire protocol between the broker and the workers.
//!
//! Both channel directions carry MessagePack payloads built from one
//! shared set of serde definitions, so encode/decode round-trips hold by
//! construction. Replies to a work request are a tagged variant — a job
//! assignment, a "no work" marker, or a "fatal" marker — decoded once at
//! the boundary and matched exhaustively.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::media_repo::{MediaDescriptor, MediaMeta};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode payload: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Broker reply to a worker's "give me work" request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkReply {
    /// A claimed job and everything needed to process it.
    Job(WorkAssignment),
    /// No eligible job right now; sleep and ask again later.
    NoWork,
    /// The broker cannot serve work at all; stop requesting.
    Fatal,
}

/// One unit of claimed work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub job_id: i64,
    pub media_id: i64,
    pub descriptor: MediaDescriptor,
}

/// Completed processing run, pushed from a worker to the broker.
///
/// `meta` is present if and only if `success` is true. The media id
/// back-reference lets the result applier persist metadata without a
/// second lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub job_id: i64,
    pub media_id: i64,
    pub success: bool,
    /// Failure reason; empty on success.
    pub message: String,
    pub meta: Option<MediaMeta>,
    pub tags: Vec<String>,
}

impl ResultPayload {
    pub fn success(assignment: &WorkAssignment, meta: MediaMeta, tags: Vec<String>) -> Self {
        Self {
            job_id: assignment.job_id,
            media_id: assignment.media_id,
            success: true,
            message: String::new(),
            meta: Some(meta),
            tags,
        }
    }

    pub fn failure(assignment: &WorkAssignment, message: String) -> Self {
        Self {
            job_id: assignment.job_id,
            media_id: assignment.media_id,
            success: false,
            message,
            meta: None,
            tags: vec![],
        }
    }
}

/// Encodes a payload for the wire.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(rmp_serde::to_vec(value)?)
}

/// Decodes a payload from the wire.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
