/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use ahash::AHashSet;

use crate::acl::RuleSet;
use crate::config::BindingConfig;

use super::BindingStats;

pub(crate) struct CommonTaskContext {
    pub(crate) binding: Arc<BindingConfig>,
    pub(crate) binding_stats: Arc<BindingStats>,
    pub(crate) acl: Option<Arc<RuleSet>>,
    pub(crate) self_addrs: Option<Arc<AHashSet<IpAddr>>>,
    pub(crate) conn_id: u64,
    pub(crate) client_addr: SocketAddr,
}

impl CommonTaskContext {
    pub(crate) fn upstream_addr(&self, sni_host: &str) -> String {
        format!("{}:{}", sni_host, self.binding.target_port)
    }
}
