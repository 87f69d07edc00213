/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};

mod error;
pub use error::{ServerTaskError, ServerTaskForbiddenError, ServerTaskResult};

mod stats;
pub use stats::{BindingAliveTaskGuard, BindingStats, SessionConnectionStats};

mod common;
use common::CommonTaskContext;

mod server;
pub use server::BindingServer;

mod accept;
use accept::ClientHelloAcceptTask;

mod relay;
use relay::RelayTask;

/// Hands out connection ids that are unique across all bindings of this
/// process, for log correlation.
#[derive(Default)]
pub struct ConnectionIdAllocator {
    next_id: AtomicU64,
}

impl ConnectionIdAllocator {
    pub fn fetch_next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}
