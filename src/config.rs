// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Layered configuration. `MeshConfig::default()` matches the
//! documented defaults; `from_env()` lets a host application populate it
//! from `MESHBUS_*` environment variables without the core ever reading
//! the environment itself.

use std::env;
use std::time::Duration;

use rand::Rng;

#[derive(Clone, Debug)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub applications: Vec<String>,
    pub nodes: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            cluster_name: String::new(),
            applications: Vec::new(),
            nodes: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MeshConfig {
    pub application_name: String,
    pub rpc_port_base: u16,
    pub pub_port_base: u16,
    pub cluster: ClusterConfig,
    pub message_timeout: Duration,
    pub cleanup_interval: Duration,
    pub beacon_interval: Duration,
    pub inactive_threshold: Duration,
    pub server_instances: usize,
    pub auto_scan: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        MeshConfig {
            application_name: rand::thread_rng().gen::<u64>().to_string(),
            rpc_port_base: 20000,
            pub_port_base: 10000,
            cluster: ClusterConfig::default(),
            message_timeout: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(30),
            beacon_interval: Duration::from_secs(5),
            inactive_threshold: Duration::from_secs(15),
            server_instances: 1,
            auto_scan: false,
        }
    }
}

impl MeshConfig {
    /// Starts from `default()` and overlays any `MESHBUS_*` variable found
    /// in the process environment. Unset variables keep their default.
    pub fn from_env() -> MeshConfig {
        let mut config = MeshConfig::default();

        if let Ok(v) = env::var("MESHBUS_APPLICATION_NAME") {
            config.application_name = v;
        }
        if let Some(v) = parse_env("MESHBUS_RPC_PORT_BASE") {
            config.rpc_port_base = v;
        }
        if let Some(v) = parse_env("MESHBUS_PUB_PORT_BASE") {
            config.pub_port_base = v;
        }
        if let Ok(v) = env::var("MESHBUS_CLUSTER_NAME") {
            config.cluster.cluster_name = v;
        }
        if let Ok(v) = env::var("MESHBUS_CLUSTER_APPLICATIONS") {
            config.cluster.applications = split_csv(&v);
        }
        if let Ok(v) = env::var("MESHBUS_CLUSTER_NODES") {
            config.cluster.nodes = split_csv(&v);
        }
        if let Some(ms) = parse_env::<u64>("MESHBUS_MESSAGE_TIMEOUT_MS") {
            config.message_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = parse_env("MESHBUS_SERVER_INSTANCES") {
            config.server_instances = v;
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = MeshConfig::default();
        assert_eq!(config.rpc_port_base, 20000);
        assert_eq!(config.pub_port_base, 10000);
        assert_eq!(config.message_timeout, Duration::from_secs(1));
        assert_eq!(config.server_instances, 1);
    }

    #[test]
    fn splits_csv_env_lists() {
        assert_eq!(split_csv("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv(""), Vec::<String>::new());
    }
}
