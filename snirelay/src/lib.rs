/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use anyhow::Context;
use log::info;

pub mod acl;
pub mod config;
pub mod logger;
pub mod opts;
pub mod resolve;
pub mod serve;
pub mod stat;

mod build;

use opts::ProcArgs;
use serve::{BindingServer, ConnectionIdAllocator};

pub async fn run(proc_args: &ProcArgs) -> anyhow::Result<()> {
    let acl = match &proc_args.acl_file {
        Some(path) => {
            let ruleset = acl::RuleSet::load_file(path)
                .context(format!("failed to load ACL rules from {}", path.display()))?;
            info!("loaded ACL rules from {}", path.display());
            Some(Arc::new(ruleset))
        }
        None => {
            info!("no ACL rules loaded, use --acl <FILE> to enable access checks");
            None
        }
    };

    let id_alloc = Arc::new(ConnectionIdAllocator::default());
    let mut servers = tokio::task::JoinSet::new();
    let mut status_entries = Vec::new();

    for binding in &proc_args.bindings {
        let server = BindingServer::new(
            binding.clone(),
            acl.clone(),
            proc_args.self_addrs.clone(),
            Arc::clone(&id_alloc),
        );
        // bind errors are fatal before any traffic is served
        let listener = server.bind().await?;
        info!(
            "listening on {} -> SNIHost:{}",
            binding.bind_addr(),
            binding.target_port
        );
        status_entries.push((server.config().clone(), server.stats().clone()));
        servers.spawn(server.serve(listener));
    }

    stat::spawn_reporter(status_entries, proc_args.status_interval);

    tokio::select! {
        r = servers.join_next() => {
            match r {
                Some(Ok(Err(e))) => Err(e),
                Some(Err(e)) => Err(anyhow::anyhow!("listener runtime failed: {e}")),
                Some(Ok(Ok(_))) | None => Ok(()),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("exiting on signal");
            Ok(())
        }
    }
}
