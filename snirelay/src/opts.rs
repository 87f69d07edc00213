/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashSet;
use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command, ValueHint};
use log::LevelFilter;

use crate::config::BindingConfig;

const ARGS_VERSION: &str = "version";
const ARGS_BIND: &str = "bind";
const ARGS_ACL_FILE: &str = "acl-file";
const ARGS_SELF_IP: &str = "self-ip";
const ARGS_IDLE_CLOSE: &str = "idle-close";
const ARGS_STATUS_INTERVAL: &str = "status-interval";
const ARGS_LOG_LEVEL: &str = "log-level";

const DEFAULT_IDLE_CLOSE_SECONDS: i64 = 300;
const DEFAULT_STATUS_INTERVAL_SECONDS: u64 = 30;

#[derive(Debug)]
pub struct ProcArgs {
    pub bindings: Vec<BindingConfig>,
    pub acl_file: Option<PathBuf>,
    pub self_addrs: Option<Arc<AHashSet<IpAddr>>>,
    pub status_interval: Duration,
    pub log_level: LevelFilter,
}

fn build_cli_args() -> Command {
    Command::new(crate::build::PKG_NAME)
        .disable_version_flag(true)
        .arg(
            Arg::new(ARGS_VERSION)
                .help("Show version")
                .action(ArgAction::SetTrue)
                .short('V')
                .long("version"),
        )
        .arg(
            Arg::new(ARGS_BIND)
                .help("Binding in <host>:<listen_port>[:<target_port>] format, may repeat")
                .num_args(1)
                .value_name("BINDING")
                .action(ArgAction::Append)
                .required_unless_present(ARGS_VERSION)
                .short('b')
                .long("bind"),
        )
        .arg(
            Arg::new(ARGS_ACL_FILE)
                .help("ACL rules file for hostname access checks")
                .num_args(1)
                .value_name("ACL FILE")
                .value_hint(ValueHint::FilePath)
                .value_parser(value_parser!(PathBuf))
                .long("acl"),
        )
        .arg(
            Arg::new(ARGS_SELF_IP)
                .help("Local addresses, to refuse hostnames that loop back into this proxy")
                .num_args(1)
                .value_name("IP[;IP...]")
                .long("self-ip"),
        )
        .arg(
            Arg::new(ARGS_IDLE_CLOSE)
                .help("Close sessions with no traffic in both directions for this many seconds, negative to disable")
                .num_args(1)
                .value_name("SECONDS")
                .value_parser(value_parser!(i64))
                .allow_negative_numbers(true)
                .long("idle-close"),
        )
        .arg(
            Arg::new(ARGS_STATUS_INTERVAL)
                .help("Interval between traffic status log lines")
                .num_args(1)
                .value_name("SECONDS")
                .value_parser(value_parser!(u64))
                .long("status-interval"),
        )
        .arg(
            Arg::new(ARGS_LOG_LEVEL)
                .help("Log level")
                .num_args(1)
                .value_name("LEVEL")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .long("log-level"),
        )
}

pub fn parse_clap() -> anyhow::Result<Option<ProcArgs>> {
    let args_parser = build_cli_args();
    let args = args_parser.get_matches();

    if args.get_flag(ARGS_VERSION) {
        crate::build::print_version();
        return Ok(None);
    }

    let idle_close_seconds = args
        .get_one::<i64>(ARGS_IDLE_CLOSE)
        .copied()
        .unwrap_or(DEFAULT_IDLE_CLOSE_SECONDS);

    let mut bindings = Vec::new();
    if let Some(values) = args.get_many::<String>(ARGS_BIND) {
        for spec in values {
            let binding = BindingConfig::parse(spec, idle_close_seconds)
                .context(format!("invalid binding spec [{spec}]"))?;
            bindings.push(binding);
        }
    }

    let self_addrs = match args.get_one::<String>(ARGS_SELF_IP) {
        Some(list) => {
            let addrs = crate::config::parse_self_ip_list(list)
                .context(format!("invalid self IP list [{list}]"))?;
            if addrs.is_empty() {
                None
            } else {
                Some(Arc::new(addrs))
            }
        }
        None => None,
    };

    let status_interval = args
        .get_one::<u64>(ARGS_STATUS_INTERVAL)
        .copied()
        .unwrap_or(DEFAULT_STATUS_INTERVAL_SECONDS)
        .max(1);

    let log_level = match args.get_one::<String>(ARGS_LOG_LEVEL).map(|s| s.as_str()) {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    Ok(Some(ProcArgs {
        bindings,
        acl_file: args.get_one::<PathBuf>(ARGS_ACL_FILE).cloned(),
        self_addrs,
        status_interval: Duration::from_secs(status_interval),
        log_level,
    }))
}
