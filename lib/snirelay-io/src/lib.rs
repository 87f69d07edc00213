/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod stream;
pub use stream::{
    ArcStreamCopyStats, StreamCopy, StreamCopyConfig, StreamCopyError, StreamCopyStats,
};

mod time;
pub use time::OptionalInterval;
