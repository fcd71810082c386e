// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Event envelope and codec.
//!
//! An [`Event`] describes one mutation of one entity. Its JSON encoding is
//! both the publish body and the payload of an SSE `data:` line.
//!
//! # Checksum
//!
//! `EventSHA` is the lowercase hex SHA-256 of the canonical encoding of the
//! event with `EventSHA` itself empty. It is recomputed on every publish.
//!
//! On receipt, [`Event::decode_verified`] checks the hash against the bytes
//! the producer actually sent (with the `EventSHA` value blanked), so
//! producers that format timestamps or escape characters differently from
//! `serde_json` still verify. [`Event::verify_checksum`] checks an in-memory
//! event against its canonical encoding.

use crate::error::{ReplicationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Protocol version stamped on every published event.
pub const EVENT_VERSION: i32 = 1;

/// Mutation kind carried in the event type suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventVerb {
    Created,
    Updated,
    Deleted,
}

impl EventVerb {
    pub const ALL: [EventVerb; 3] = [EventVerb::Created, EventVerb::Updated, EventVerb::Deleted];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventVerb::Created => "Created",
            EventVerb::Updated => "Updated",
            EventVerb::Deleted => "Deleted",
        }
    }

    /// Full event type for an entity prefix, e.g. `"order"` → `"orderCreated"`.
    pub fn event_type(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.as_str())
    }
}

impl std::fmt::Display for EventVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope for one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "EventId")]
    pub event_id: String,

    #[serde(rename = "EventSHA", default)]
    pub event_sha: String,

    #[serde(rename = "EventType")]
    pub event_type: String,

    #[serde(rename = "EventData")]
    pub event_data: String,

    #[serde(rename = "EventVersion")]
    pub event_version: i32,

    #[serde(rename = "EventTime", default)]
    pub event_time: DateTime<Utc>,
}

impl Event {
    /// Build an event for `prefix + verb` with a fresh id and the current time.
    pub fn new(prefix: &str, verb: EventVerb, event_data: String) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_sha: String::new(),
            event_type: verb.event_type(prefix),
            event_data,
            event_version: EVENT_VERSION,
            event_time: Utc::now(),
        }
    }

    /// Build an event carrying the canonical JSON encoding of `entity`.
    pub fn for_entity<T: Serialize>(prefix: &str, verb: EventVerb, entity: &T) -> Result<Self> {
        let data = serde_json::to_string(entity).map_err(|source| ReplicationError::Encode {
            what: "entity",
            source,
        })?;
        Ok(Self::new(prefix, verb, data))
    }

    /// Canonical JSON encoding.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|source| ReplicationError::Encode {
            what: "event",
            source,
        })
    }

    /// Decode an envelope from its JSON encoding.
    pub fn decode(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ReplicationError::EventDecode {
            message: format!("invalid event envelope: {}", e),
            source: Some(e),
        })
    }

    /// Compute the checksum over the encoding with `EventSHA` empty.
    pub fn compute_checksum(&self) -> Result<String> {
        let unsigned = Event {
            event_sha: String::new(),
            ..self.clone()
        };
        Ok(compute_content_hash(unsigned.encode()?.as_bytes()))
    }

    /// Populate `EventSHA` from the current content.
    pub fn seal(&mut self) -> Result<()> {
        self.event_sha = self.compute_checksum()?;
        Ok(())
    }

    /// Check `EventSHA` against the content.
    ///
    /// Events without a checksum pass; the field is optional on the wire.
    pub fn verify_checksum(&self) -> Result<()> {
        if self.event_sha.is_empty() {
            return Ok(());
        }
        let computed = self.compute_checksum()?;
        if computed != self.event_sha {
            return Err(ReplicationError::ChecksumMismatch {
                event_id: self.event_id.clone(),
                expected: self.event_sha.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Decode an envelope and check `EventSHA` against the received text.
    ///
    /// Envelopes whose checksum field cannot be located in the text fall
    /// back to the canonical encoding.
    pub fn decode_verified(json: &str) -> Result<Self> {
        let event = Self::decode(json)?;
        if event.event_sha.is_empty() {
            return Ok(event);
        }

        let computed = match blank_checksum(json, &event.event_sha) {
            Some(unsigned) => compute_content_hash(unsigned.as_bytes()),
            None => event.compute_checksum()?,
        };
        if computed != event.event_sha {
            return Err(ReplicationError::ChecksumMismatch {
                event_id: event.event_id,
                expected: event.event_sha,
                computed,
            });
        }
        Ok(event)
    }

    /// Verb of this event if its type is `prefix + verb`.
    pub fn verb_for_prefix(&self, prefix: &str) -> Option<EventVerb> {
        let suffix = self.event_type.strip_prefix(prefix)?;
        EventVerb::ALL.into_iter().find(|v| v.as_str() == suffix)
    }
}

/// Replace the `"EventSHA": "<sha>"` value in `json` with `""`, keeping
/// every other byte (including whitespace around the colon) as sent.
fn blank_checksum(json: &str, sha: &str) -> Option<String> {
    const KEY: &str = "\"EventSHA\"";

    let key_end = json.find(KEY)? + KEY.len();
    let value = json[key_end..].trim_start().strip_prefix(':')?.trim_start();
    let rest = value.strip_prefix('"')?.strip_prefix(sha)?.strip_prefix('"')?;

    let value_start = json.len() - value.len();
    let value_end = json.len() - rest.len();
    let mut unsigned = String::with_capacity(json.len() - sha.len());
    unsigned.push_str(&json[..value_start]);
    unsigned.push_str("\"\"");
    unsigned.push_str(&json[value_end..]);
    Some(unsigned)
}

/// Compute SHA256 content hash as hex string.
pub fn compute_content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
