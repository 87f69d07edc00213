/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::time::Instant;

use crate::config::BindingConfig;
use crate::serve::BindingStats;

/// Periodically log a traffic snapshot of every binding. Counters are
/// plain atomics, a slightly torn snapshot across fields is acceptable.
pub fn spawn_reporter(entries: Vec<(Arc<BindingConfig>, Arc<BindingStats>)>, period: Duration) {
    if entries.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            interval.tick().await;
            for (config, stats) in &entries {
                info!(
                    "*** STATUS {} -> SNIHost:{}: uploaded {} bytes, downloaded {} bytes, \
                     active {}, total handled {}",
                    config.bind_addr(),
                    config.target_port,
                    stats.uploaded(),
                    stats.downloaded(),
                    stats.active(),
                    stats.total_handled()
                );
            }
        }
    });
}
