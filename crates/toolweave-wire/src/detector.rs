//! Protocol sniffing from the leading bytes of a frame
//!
//! Signatures are checked in a fixed order and the first match wins:
//! TLS, HTTP, SSH, Redis, MySQL, PostgreSQL, MongoDB, SMTP, FTP.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;

const HTTP_METHODS: [&[u8]; 9] = [
    b"GET ",
    b"POST ",
    b"PUT ",
    b"DELETE ",
    b"HEAD ",
    b"OPTIONS ",
    b"PATCH ",
    b"CONNECT ",
    b"TRACE ",
];

const SMTP_PREFIXES: [&[u8]; 6] = [
    b"220 ",
    b"220-",
    b"EHLO ",
    b"HELO ",
    b"MAIL FROM:",
    b"RCPT TO:",
];

const FTP_PREFIXES: [&[u8]; 8] = [
    b"USER ", b"PASS ", b"QUIT", b"TYPE ", b"RETR ", b"STOR ", b"PASV", b"LIST",
];

/// PostgreSQL SSLRequest code (1234 << 16 | 5679)
const PG_SSL_REQUEST: u32 = 80_877_103;
/// PostgreSQL protocol 3.0 startup message version
const PG_PROTOCOL_V3: u32 = 196_608;

/// MongoDB wire opcodes: OP_REPLY, OP_QUERY, OP_COMPRESSED, OP_MSG
const MONGO_OPCODES: [u32; 4] = [1, 2004, 2012, 2013];

/// Protocol identified from a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    Unknown,
    Tls,
    Http,
    Ssh,
    Redis,
    MySql,
    PostgreSql,
    MongoDb,
    Smtp,
    Ftp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Unknown => "Unknown",
            Protocol::Tls => "TLS",
            Protocol::Http => "HTTP",
            Protocol::Ssh => "SSH",
            Protocol::Redis => "Redis",
            Protocol::MySql => "MySQL",
            Protocol::PostgreSql => "PostgreSQL",
            Protocol::MongoDb => "MongoDB",
            Protocol::Smtp => "SMTP",
            Protocol::Ftp => "FTP",
        }
    }

    /// Carries no parseable plaintext framing
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Protocol::Tls | Protocol::Ssh)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless signature-table detector
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolDetector;

impl ProtocolDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, data: &[u8]) -> Protocol {
        if is_tls(data) {
            Protocol::Tls
        } else if is_http(data) {
            Protocol::Http
        } else if data.starts_with(b"SSH-") {
            Protocol::Ssh
        } else if is_redis(data) {
            Protocol::Redis
        } else if is_mysql(data) {
            Protocol::MySql
        } else if is_postgres(data) {
            Protocol::PostgreSql
        } else if is_mongodb(data) {
            Protocol::MongoDb
        } else if starts_with_any(data, &SMTP_PREFIXES) {
            Protocol::Smtp
        } else if starts_with_any(data, &FTP_PREFIXES) {
            Protocol::Ftp
        } else {
            Protocol::Unknown
        }
    }

    pub fn detect_from_frame(&self, frame: &Frame) -> Protocol {
        self.detect(frame.payload())
    }

    pub fn is_encrypted(&self, protocol: Protocol) -> bool {
        protocol.is_encrypted()
    }
}

fn starts_with_any(data: &[u8], prefixes: &[&[u8]]) -> bool {
    prefixes.iter().any(|prefix| data.starts_with(prefix))
}

/// Record type (change_cipher_spec..application_data) + major version 3
fn is_tls(data: &[u8]) -> bool {
    data.len() >= 2
        && (0x14..=0x17).contains(&data[0])
        && data[1] == 0x03
        && data.get(2).map_or(true, |&minor| minor <= 0x04)
}

fn is_http(data: &[u8]) -> bool {
    data.starts_with(b"HTTP/") || starts_with_any(data, &HTTP_METHODS)
}

fn is_resp_integer(bytes: &[u8]) -> bool {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    !digits.is_empty() && digits.iter().all(u8::is_ascii_digit)
}

fn is_redis(data: &[u8]) -> bool {
    let Some((&marker, rest)) = data.split_first() else {
        return false;
    };
    match marker {
        b'*' | b'$' => rest.first().is_some_and(u8::is_ascii_digit) || rest.starts_with(b"-1"),
        b'+' | b'-' | b':' => {
            let Some(end) = rest.windows(2).position(|w| w == b"\r\n") else {
                return false;
            };
            let line = &rest[..end];
            if marker == b':' {
                is_resp_integer(line)
            } else {
                !line.is_empty() && line.iter().all(|b| !b.is_ascii_control())
            }
        }
        _ => false,
    }
}

/// Server greeting: 3-byte length, sequence 0, protocol version 10
fn is_mysql(data: &[u8]) -> bool {
    if data.len() < 5 {
        return false;
    }
    let length = u32::from_le_bytes([data[0], data[1], data[2], 0]);
    length > 0 && data[3] == 0x00 && data[4] == 0x0a
}

/// SSLRequest or v3 StartupMessage
fn is_postgres(data: &[u8]) -> bool {
    if data.len() < 8 {
        return false;
    }
    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let code = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    (length == 8 && code == PG_SSL_REQUEST) || (length >= 8 && code == PG_PROTOCOL_V3)
}

/// Standard message header with a known opcode at offset 12
fn is_mongodb(data: &[u8]) -> bool {
    if data.len() < 16 {
        return false;
    }
    let opcode = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
    MONGO_OPCODES.contains(&opcode)
}
