/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use snirelay_io::{ArcStreamCopyStats, StreamCopyStats};

/// Traffic aggregates of one binding. All fields are atomics, the status
/// reporter reads them without locking while sessions keep writing.
#[derive(Default)]
pub struct BindingStats {
    uploaded: AtomicU64,
    downloaded: AtomicU64,
    active: AtomicI64,
    total_handled: AtomicI64,
}

impl BindingStats {
    pub fn add_uploaded(&self, size: u64) {
        self.uploaded.fetch_add(size, Ordering::Relaxed);
    }

    pub fn add_downloaded(&self, size: u64) {
        self.downloaded.fetch_add(size, Ordering::Relaxed);
    }

    #[inline]
    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_handled(&self) -> i64 {
        self.total_handled.load(Ordering::Relaxed)
    }

    /// Mark one session alive. Dropping the returned guard marks it
    /// completed, so `active` can never go negative and `total_handled`
    /// only counts finished sessions.
    pub fn add_task(self: &Arc<Self>) -> BindingAliveTaskGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        BindingAliveTaskGuard(Arc::clone(self))
    }
}

pub struct BindingAliveTaskGuard(Arc<BindingStats>);

impl Drop for BindingAliveTaskGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
        self.0.total_handled.fetch_add(1, Ordering::Relaxed);
    }
}

/// Byte counters of one session, for the closing log line.
#[derive(Default)]
pub struct SessionConnectionStats {
    uploaded: AtomicU64,
    downloaded: AtomicU64,
}

impl SessionConnectionStats {
    pub fn add_uploaded(&self, size: u64) {
        self.uploaded.fetch_add(size, Ordering::Relaxed);
    }

    pub fn add_downloaded(&self, size: u64) {
        self.downloaded.fetch_add(size, Ordering::Relaxed);
    }

    #[inline]
    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }
}

struct UploadWrapperStats {
    binding: Arc<BindingStats>,
    session: Arc<SessionConnectionStats>,
}

impl StreamCopyStats for UploadWrapperStats {
    fn add_copied_bytes(&self, size: u64) {
        self.session.add_uploaded(size);
        self.binding.add_uploaded(size);
    }
}

struct DownloadWrapperStats {
    binding: Arc<BindingStats>,
    session: Arc<SessionConnectionStats>,
}

impl StreamCopyStats for DownloadWrapperStats {
    fn add_copied_bytes(&self, size: u64) {
        self.session.add_downloaded(size);
        self.binding.add_downloaded(size);
    }
}

/// Build the (upload, download) stats sinks for one session's copy
/// directions, feeding both the session and the binding counters.
pub(crate) fn session_wrapper_stats_pair(
    binding: &Arc<BindingStats>,
    session: &Arc<SessionConnectionStats>,
) -> (ArcStreamCopyStats, ArcStreamCopyStats) {
    let upload = UploadWrapperStats {
        binding: Arc::clone(binding),
        session: Arc::clone(session),
    };
    let download = DownloadWrapperStats {
        binding: Arc::clone(binding),
        session: Arc::clone(session),
    };
    (Arc::new(upload), Arc::new(download))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alive_task_guard() {
        let stats = Arc::new(BindingStats::default());

        let g1 = stats.add_task();
        let g2 = stats.add_task();
        assert_eq!(stats.active(), 2);
        assert_eq!(stats.total_handled(), 0);

        drop(g1);
        assert_eq!(stats.active(), 1);
        assert_eq!(stats.total_handled(), 1);

        drop(g2);
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.total_handled(), 2);
    }

    #[test]
    fn wrapper_pair_feeds_both_levels() {
        let binding = Arc::new(BindingStats::default());
        let session = Arc::new(SessionConnectionStats::default());
        let (upload, download) = session_wrapper_stats_pair(&binding, &session);

        upload.add_copied_bytes(10);
        upload.add_copied_bytes(5);
        download.add_copied_bytes(7);

        assert_eq!(binding.uploaded(), 15);
        assert_eq!(binding.downloaded(), 7);
        assert_eq!(session.uploaded(), 15);
        assert_eq!(session.downloaded(), 7);
    }
}
