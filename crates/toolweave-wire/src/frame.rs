use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a connection produced the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ClientToServer => "client->server",
            Direction::ServerToClient => "server->client",
        }
    }

    pub fn reverse(&self) -> Self {
        match self {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous chunk of one direction of a byte stream.
///
/// The payload is fixed at creation; only the unknown-protocol flag may
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
    direction: Direction,
    timestamp: Option<DateTime<Utc>>,
    unknown_protocol: bool,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>, direction: Direction) -> Self {
        Self {
            payload: payload.into(),
            direction,
            timestamp: None,
            unknown_protocol: false,
        }
    }

    /// Time the first byte of the frame was received
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Set when the frame was cut at a size limit, so its leading bytes
    /// may not start a protocol message.
    pub fn is_unknown_protocol(&self) -> bool {
        self.unknown_protocol
    }

    pub fn set_unknown_protocol(&mut self, unknown: bool) {
        self.unknown_protocol = unknown;
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let now = Utc::now();
        let mut frame = Frame::new(&b"hello"[..], Direction::ClientToServer).with_timestamp(now);
        assert_eq!(frame.payload().as_ref(), b"hello");
        assert_eq!(frame.size(), 5);
        assert_eq!(frame.direction(), Direction::ClientToServer);
        assert_eq!(frame.timestamp(), Some(now));
        assert!(!frame.is_unknown_protocol());

        frame.set_unknown_protocol(true);
        assert!(frame.is_unknown_protocol());
    }

    #[test]
    fn test_direction_strings() {
        assert_eq!(Direction::ClientToServer.to_string(), "client->server");
        assert_eq!(Direction::ServerToClient.to_string(), "server->client");
        assert_eq!(Direction::ClientToServer.reverse(), Direction::ServerToClient);
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::new(Vec::new(), Direction::ServerToClient);
        assert!(frame.is_empty());
        assert_eq!(frame.timestamp(), None);
    }
}
