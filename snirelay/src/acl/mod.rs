/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::Path;

use ahash::AHashSet;
use anyhow::{anyhow, Context};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

const RULE_PREFIX_HOST: &str = "host:";
const RULE_PREFIX_PATTERN: &str = "pattern:";

#[derive(Deserialize)]
struct RuleSetJson {
    no_match_decision: String,
    #[serde(default)]
    whitelist: Vec<String>,
    #[serde(default)]
    blacklist: Vec<String>,
}

/// Compiled hostname access rules. Built once at startup and shared
/// read-only by all session tasks.
pub struct RuleSet {
    default_allow: bool,
    allowed_hosts: AHashSet<String>,
    denied_hosts: AHashSet<String>,
    allowed_patterns: Vec<Regex>,
    denied_patterns: Vec<Regex>,
}

impl RuleSet {
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .context(format!("failed to read {}", path.display()))?;
        Self::load_json(&data)
    }

    pub fn load_json(data: &str) -> anyhow::Result<Self> {
        let raw: RuleSetJson =
            serde_json::from_str(data).context("invalid json in ACL rules")?;

        let default_allow = match raw.no_match_decision.to_ascii_lowercase().as_str() {
            "allow" | "accept" => true,
            "reject" | "deny" => false,
            "" => return Err(anyhow!("required field `no_match_decision` not set")),
            other => {
                return Err(anyhow!(
                    "unknown decision [{other}], expect allow|accept|reject|deny"
                ));
            }
        };

        let mut ruleset = RuleSet {
            default_allow,
            allowed_hosts: AHashSet::new(),
            denied_hosts: AHashSet::new(),
            allowed_patterns: Vec::new(),
            denied_patterns: Vec::new(),
        };
        for rule in &raw.whitelist {
            ruleset
                .add_allowed(rule)
                .context(format!("invalid whitelist rule [{rule}]"))?;
        }
        for rule in &raw.blacklist {
            ruleset
                .add_denied(rule)
                .context(format!("invalid blacklist rule [{rule}]"))?;
        }
        Ok(ruleset)
    }

    fn add_allowed(&mut self, rule: &str) -> anyhow::Result<()> {
        add_rule(rule, &mut self.allowed_hosts, &mut self.allowed_patterns)
    }

    fn add_denied(&mut self, rule: &str) -> anyhow::Result<()> {
        add_rule(rule, &mut self.denied_hosts, &mut self.denied_patterns)
    }

    /// Decide whether `host` may be relayed to. With a permissive default
    /// only the denied rules are consulted, with a restrictive default only
    /// the allowed rules. Hostname matching is case insensitive.
    pub fn check_access(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        if self.default_allow {
            !rule_match(&host, &self.denied_hosts, &self.denied_patterns)
        } else {
            rule_match(&host, &self.allowed_hosts, &self.allowed_patterns)
        }
    }
}

fn add_rule(
    rule: &str,
    hosts: &mut AHashSet<String>,
    patterns: &mut Vec<Regex>,
) -> anyhow::Result<()> {
    let rule = rule.to_lowercase();
    if let Some(host) = rule.strip_prefix(RULE_PREFIX_HOST) {
        hosts.insert(host.to_string());
        Ok(())
    } else if let Some(pattern) = rule.strip_prefix(RULE_PREFIX_PATTERN) {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .context(format!("invalid pattern [{pattern}]"))?;
        patterns.push(regex);
        Ok(())
    } else {
        Err(anyhow!(
            "expect a `{RULE_PREFIX_HOST}` or `{RULE_PREFIX_PATTERN}` prefix"
        ))
    }
}

fn rule_match(host: &str, hosts: &AHashSet<String>, patterns: &[Regex]) -> bool {
    if hosts.contains(host) {
        return true;
    }
    patterns.iter().any(|p| p.is_match(host))
}
