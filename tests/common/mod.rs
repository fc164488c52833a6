//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use litd_gateway::config::error::ConfigError;
use litd_gateway::config::schema::{FaradayConfig, IntegratedParams, SubDaemonConfig};
use litd_gateway::config::{Defaults, NodeValidator, SubDaemonValidator};
use tempfile::TempDir;

pub const PASSWORD: &str = "correct-horse-battery";

/// A fresh home directory with defaults rooted under it.
pub fn sandbox() -> (TempDir, Defaults) {
    let tmp = tempfile::tempdir().unwrap();
    let defaults = Defaults::rooted_at(tmp.path());
    (tmp, defaults)
}

/// Build argv with the program name prepended.
pub fn argv(args: &[&str]) -> Vec<String> {
    std::iter::once("litd")
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect()
}

/// An environment with no variables set.
pub fn no_env(_: &str) -> Option<String> {
    None
}

/// A free loopback port. Racy, but good enough for tests.
pub fn free_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Node validator that accepts everything unchanged.
#[derive(Default)]
pub struct AcceptingNode {
    pub calls: AtomicUsize,
}

impl NodeValidator for AcceptingNode {
    fn validate(
        &self,
        params: IntegratedParams,
        _defaults: &Defaults,
    ) -> Result<IntegratedParams, ConfigError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(params)
    }
}

/// Sub-daemon validator that records which daemons it saw.
#[derive(Default, Clone)]
pub struct RecordingSubDaemons {
    pub seen: Arc<std::sync::Mutex<Vec<&'static str>>>,
}

impl RecordingSubDaemons {
    pub fn seen(&self) -> Vec<&'static str> {
        self.seen.lock().unwrap().clone()
    }
}

impl SubDaemonValidator for RecordingSubDaemons {
    fn validate_loop(&self, cfg: SubDaemonConfig) -> Result<SubDaemonConfig, ConfigError> {
        self.seen.lock().unwrap().push("loop");
        Ok(cfg)
    }

    fn validate_pool(&self, cfg: SubDaemonConfig) -> Result<SubDaemonConfig, ConfigError> {
        self.seen.lock().unwrap().push("pool");
        Ok(cfg)
    }

    fn validate_faraday(&self, cfg: FaradayConfig) -> Result<FaradayConfig, ConfigError> {
        self.seen.lock().unwrap().push("faraday");
        Ok(cfg)
    }
}
