/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::IpAddr;

use ahash::AHashSet;

/// Resolve a hostname to its addresses. Resolution failure yields an empty
/// list, the caller's dial attempt will surface the real error.
pub async fn resolve_host(host: &str) -> Vec<IpAddr> {
    match tokio::net::lookup_host((host, 0u16)).await {
        Ok(addrs) => addrs.map(|addr| addr.ip()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Check whether dialing `host` would connect back into one of our own
/// addresses.
pub async fn is_self_target(host: &str, self_addrs: &AHashSet<IpAddr>) -> bool {
    resolve_host(host)
        .await
        .iter()
        .any(|ip| self_addrs.contains(ip))
}
