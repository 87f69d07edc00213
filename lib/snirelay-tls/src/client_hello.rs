/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

use super::extension::{ExtensionIter, EXTENSION_TYPE_SERVER_NAME};
use super::record::{CONTENT_TYPE_HANDSHAKE, RECORD_HEADER_SIZE, VERSION_MAJOR_TLS};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClientHelloParseError {
    #[error("invalid record type")]
    InvalidRecordType,
    #[error("invalid record version")]
    InvalidRecordVersion,
    #[error("unsupported handshake version")]
    UnsupportedHandshakeVersion,
    #[error("record length doesn't match buffer size")]
    OuterLengthMismatch,
    #[error("handshake message length doesn't match buffer size")]
    InnerLengthMismatch,
    #[error("server_name extension size mismatch")]
    ExtensionSizeMismatch,
    #[error("no usable server_name extension")]
    ExtensionNotFound,
    #[error("length field runs past the buffer end")]
    BoundaryOverrun,
}

/// The fields recovered from a ClientHello. An empty `sni_host` means the
/// client sent a server_name extension with a zero-length hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHelloInfo {
    pub sni_host: String,
}

// record header (5) + handshake header (4) + client version (2) + random (32)
const FIXED_PREFIX_SIZE: usize = 43;

const HANDSHAKE_MSG_LEN_OFFSET: usize = 7;
const HANDSHAKE_VERSION_OFFSET: usize = 9;

#[inline]
fn fetch(data: &[u8], offset: usize) -> Result<u8, ClientHelloParseError> {
    data.get(offset)
        .copied()
        .ok_or(ClientHelloParseError::BoundaryOverrun)
}

#[inline]
fn fetch_u16(data: &[u8], offset: usize) -> Result<u16, ClientHelloParseError> {
    let hi = fetch(data, offset)?;
    let lo = fetch(data, offset + 1)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

#[inline]
fn minor_version_ok(minor: u8) -> bool {
    (0x01..=0x04).contains(&minor)
}

impl ClientHelloInfo {
    /// Parse one complete ClientHello record and extract the SNI hostname.
    ///
    /// The buffer is untrusted: every length field is checked before use and
    /// a field running past the buffer end reports
    /// [`ClientHelloParseError::BoundaryOverrun`] instead of panicking.
    pub fn parse(data: &[u8]) -> Result<Self, ClientHelloParseError> {
        if fetch(data, 0)? != CONTENT_TYPE_HANDSHAKE {
            return Err(ClientHelloParseError::InvalidRecordType);
        }
        if fetch(data, 1)? != VERSION_MAJOR_TLS {
            return Err(ClientHelloParseError::InvalidRecordVersion);
        }
        if !minor_version_ok(fetch(data, 2)?) {
            return Err(ClientHelloParseError::InvalidRecordVersion);
        }

        let fragment_len = fetch_u16(data, 3)? as usize;
        if data.len() < fragment_len + RECORD_HEADER_SIZE {
            return Err(ClientHelloParseError::OuterLengthMismatch);
        }

        // only the low 16 bits of the 24-bit message length are read; a
        // single-record hello can never need the top byte
        let msg_len = fetch_u16(data, HANDSHAKE_MSG_LEN_OFFSET)? as usize;
        if data.len() != msg_len + HANDSHAKE_MSG_LEN_OFFSET + 2 {
            return Err(ClientHelloParseError::InnerLengthMismatch);
        }

        if fetch(data, HANDSHAKE_VERSION_OFFSET)? != VERSION_MAJOR_TLS {
            return Err(ClientHelloParseError::UnsupportedHandshakeVersion);
        }
        if !minor_version_ok(fetch(data, HANDSHAKE_VERSION_OFFSET + 1)?) {
            return Err(ClientHelloParseError::UnsupportedHandshakeVersion);
        }

        let mut offset = FIXED_PREFIX_SIZE;

        // Session ID
        let session_id_len = fetch(data, offset)? as usize;
        offset += 1 + session_id_len;

        // Cipher Suites
        let cipher_suites_len = fetch_u16(data, offset)? as usize;
        offset += 2 + cipher_suites_len;

        // Compression Methods
        let compression_methods_len = fetch(data, offset)? as usize;
        offset += 1 + compression_methods_len;

        // the extensions block length is skipped without being checked, the
        // walk below runs to the end of the buffer instead
        offset += 2;

        let extensions = data
            .get(offset..)
            .ok_or(ClientHelloParseError::BoundaryOverrun)?;

        // if the type repeats, the last occurrence wins
        let mut sni_data = None;
        for ext in ExtensionIter::new(extensions) {
            let ext = ext?;
            if ext.r#type() == EXTENSION_TYPE_SERVER_NAME {
                sni_data = Some(ext.data());
            }
        }

        let Some(sni_data) = sni_data else {
            return Err(ClientHelloParseError::ExtensionNotFound);
        };
        Self::decode_server_name(sni_data)
    }

    fn decode_server_name(data: &[u8]) -> Result<Self, ClientHelloParseError> {
        let list_len = fetch_u16(data, 0)? as usize;
        if data.len() != list_len + 2 {
            return Err(ClientHelloParseError::ExtensionSizeMismatch);
        }

        let name_type = fetch(data, 2)?;
        let name_len = fetch_u16(data, 3)? as usize;
        // only a hostname entry (type 0) of consistent length is usable,
        // anything else counts as not found
        if name_type == 0 && list_len.checked_sub(3) == Some(name_len) {
            if let Ok(host) = std::str::from_utf8(&data[5..]) {
                return Ok(ClientHelloInfo {
                    sni_host: host.to_string(),
                });
            }
        }
        Err(ClientHelloParseError::ExtensionNotFound)
    }
}
