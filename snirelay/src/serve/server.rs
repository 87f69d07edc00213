/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::IpAddr;
use std::sync::Arc;

use ahash::AHashSet;
use anyhow::Context;
use log::info;
use tokio::net::TcpListener;

use crate::acl::RuleSet;
use crate::config::BindingConfig;

use super::{BindingStats, ClientHelloAcceptTask, CommonTaskContext, ConnectionIdAllocator};

/// One listener and the shared state its sessions need. Accepted
/// connections run in their own tasks and never affect the accept loop.
pub struct BindingServer {
    config: Arc<BindingConfig>,
    stats: Arc<BindingStats>,
    acl: Option<Arc<RuleSet>>,
    self_addrs: Option<Arc<AHashSet<IpAddr>>>,
    id_alloc: Arc<ConnectionIdAllocator>,
}

impl BindingServer {
    pub fn new(
        config: BindingConfig,
        acl: Option<Arc<RuleSet>>,
        self_addrs: Option<Arc<AHashSet<IpAddr>>>,
        id_alloc: Arc<ConnectionIdAllocator>,
    ) -> Self {
        BindingServer {
            config: Arc::new(config),
            stats: Arc::new(BindingStats::default()),
            acl,
            self_addrs,
            id_alloc,
        }
    }

    #[inline]
    pub fn config(&self) -> &Arc<BindingConfig> {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &Arc<BindingStats> {
        &self.stats
    }

    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let addr = self.config.bind_addr();
        TcpListener::bind(addr.as_str())
            .await
            .context(format!("failed to listen on {addr}"))
    }

    /// Accept loop. An accept error is returned to the caller and takes the
    /// whole process down, per-session failures stay inside their tasks.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer_addr) = listener
                .accept()
                .await
                .context(format!("accept failed on {}", self.config.bind_addr()))?;
            let conn_id = self.id_alloc.fetch_next();
            info!(
                "{} accepted client {} on {}",
                conn_id,
                peer_addr,
                self.config.bind_addr()
            );
            let ctx = CommonTaskContext {
                binding: Arc::clone(&self.config),
                binding_stats: Arc::clone(&self.stats),
                acl: self.acl.clone(),
                self_addrs: self.self_addrs.clone(),
                conn_id,
                client_addr: peer_addr,
            };
            tokio::spawn(async move {
                ClientHelloAcceptTask::new(ctx).into_running(stream).await;
            });
        }
    }
}
