/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod record;
pub use record::record_is_complete;

mod extension;

mod client_hello;
pub use client_hello::{ClientHelloInfo, ClientHelloParseError};
