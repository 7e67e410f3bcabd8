use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// 12-byte document identifier rendered as 24 lowercase hex characters.
///
/// The first four bytes are the creation time in seconds (big endian), the
/// remaining eight are random, so ids sort roughly by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

pub const OBJECT_ID_LEN: usize = 24;

impl ObjectId {
    pub fn generate() -> Self {
        let secs = chrono::Utc::now().timestamp() as u32;
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        rand::thread_rng().fill(&mut bytes[4..]);
        Self(hex::encode(bytes))
    }

    /// Parse a client-supplied id. Either hex case is accepted.
    pub fn parse(raw: &str) -> Result<Self, InvalidObjectId> {
        if raw.len() != OBJECT_ID_LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidObjectId(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = InvalidObjectId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = InvalidObjectId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier '{0}': expected {OBJECT_ID_LEN} hex characters")]
pub struct InvalidObjectId(pub String);

impl From<InvalidObjectId> for AppError {
    fn from(err: InvalidObjectId) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
