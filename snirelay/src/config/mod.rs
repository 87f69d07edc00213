/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::IpAddr;

use ahash::AHashSet;
use anyhow::{anyhow, Context};

/// One configured listener: where to accept, which port to dial on the
/// host taken from the client hello, and the idle close threshold for its
/// sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub target_port: u16,
    pub idle_close_seconds: i64,
}

impl BindingConfig {
    /// Parse a `<host>:<listen_port>[:<target_port>]` spec. The two token
    /// form reuses the listen port as the target port.
    pub fn parse(spec: &str, idle_close_seconds: i64) -> anyhow::Result<Self> {
        let tokens: Vec<&str> = spec.split(':').collect();
        let (bind_host, bind_port, target_port) = match tokens.len() {
            2 => {
                let port = parse_port(tokens[1])?;
                (tokens[0], port, port)
            }
            3 => (tokens[0], parse_port(tokens[1])?, parse_port(tokens[2])?),
            _ => {
                return Err(anyhow!(
                    "expect <host>:<listen_port> or <host>:<listen_port>:<target_port>"
                ));
            }
        };
        if bind_host.is_empty() {
            return Err(anyhow!("empty bind host"));
        }
        Ok(BindingConfig {
            bind_host: bind_host.to_string(),
            bind_port,
            target_port,
            idle_close_seconds,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}

fn parse_port(s: &str) -> anyhow::Result<u16> {
    s.parse::<u16>().context(format!("invalid port [{s}]"))
}

/// Parse a semicolon separated list of literal IP addresses. Entries are
/// trimmed and empty ones skipped.
pub fn parse_self_ip_list(list: &str) -> anyhow::Result<AHashSet<IpAddr>> {
    let mut addrs = AHashSet::new();
    for token in list.split(';') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let ip = token
            .parse::<IpAddr>()
            .context(format!("invalid IP address [{token}]"))?;
        addrs.insert(ip);
    }
    Ok(addrs)
}
