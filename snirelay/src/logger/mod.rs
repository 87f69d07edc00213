/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

struct StdoutLogger {
    max_level: LevelFilter,
}

impl Log for StdoutLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!(
                "{} {:5} {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"),
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

pub fn setup(max_level: LevelFilter) -> anyhow::Result<()> {
    log::set_boxed_logger(Box::new(StdoutLogger { max_level }))
        .map_err(|e| anyhow!("failed to install logger: {e}"))?;
    log::set_max_level(max_level);
    Ok(())
}
