/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use super::ClientHelloParseError;

pub(crate) const EXTENSION_TYPE_SERVER_NAME: u16 = 0x0000;

pub(crate) struct Extension<'a> {
    ext_type: u16,
    ext_data: &'a [u8],
}

impl<'a> Extension<'a> {
    const HEADER_LEN: usize = 4;

    #[inline]
    pub(crate) fn r#type(&self) -> u16 {
        self.ext_type
    }

    #[inline]
    pub(crate) fn data(&self) -> &'a [u8] {
        self.ext_data
    }

    fn parse(data: &'a [u8]) -> Result<Self, ClientHelloParseError> {
        if data.len() < Self::HEADER_LEN {
            return Err(ClientHelloParseError::BoundaryOverrun);
        }

        let ext_type = u16::from_be_bytes([data[0], data[1]]);
        let ext_len = u16::from_be_bytes([data[2], data[3]]) as usize;

        let start = Self::HEADER_LEN;
        let end = start + ext_len;
        if end > data.len() {
            return Err(ClientHelloParseError::BoundaryOverrun);
        }
        Ok(Extension {
            ext_type,
            ext_data: &data[start..end],
        })
    }
}

/// Walks a raw extensions buffer until it is exhausted. A length field that
/// runs past the buffer end yields an error item and then stops.
pub(crate) struct ExtensionIter<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ExtensionIter<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        ExtensionIter { data, offset: 0 }
    }
}

impl<'a> Iterator for ExtensionIter<'a> {
    type Item = Result<Extension<'a>, ClientHelloParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        match Extension::parse(&self.data[self.offset..]) {
            Ok(ext) => {
                self.offset += Extension::HEADER_LEN + ext.ext_data.len();
                Some(Ok(ext))
            }
            Err(e) => {
                self.offset = self.data.len();
                Some(Err(e))
            }
        }
    }
}
