//! Environment tuning knobs.
//!
//! All values are read once, when the environment is built, from the
//! configuration registry's string properties. A missing or unparsable value
//! falls back to the field's default; construction never fails on tuning.

use std::str::FromStr;
use std::time::Duration;

use relaybus_core::ConfigurationRegistry;
use tracing::warn;

/// Property keys for one worker pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolKeys {
    pub core_threads: &'static str,
    pub max_threads: &'static str,
    pub keep_alive_secs: &'static str,
    pub queue_length: &'static str,
    pub thread_group: &'static str,
    pub thread_name_prefix: &'static str,
}

pub const GENERAL_POOL_KEYS: PoolKeys = PoolKeys {
    core_threads: "relaybus.threads.core",
    max_threads: "relaybus.threads.max",
    keep_alive_secs: "relaybus.threads.keepalive",
    queue_length: "relaybus.threads.qlen",
    thread_group: "relaybus.threads.group",
    thread_name_prefix: "relaybus.threads.idprefix",
};

pub const INBOUND_POOL_KEYS: PoolKeys = PoolKeys {
    core_threads: "relaybus.inbound.threads.core",
    max_threads: "relaybus.inbound.threads.max",
    keep_alive_secs: "relaybus.inbound.threads.keepalive",
    queue_length: "relaybus.inbound.threads.qlen",
    thread_group: "relaybus.inbound.threads.group",
    thread_name_prefix: "relaybus.inbound.threads.idprefix",
};

/// Global mediation timeout in milliseconds.
pub const GLOBAL_TIMEOUT_KEY: &str = "relaybus.global_timeout_interval";

pub const DEFAULT_GLOBAL_TIMEOUT_MS: u64 = 120_000;

/// Sizing and identity of a bounded worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Threads kept alive while idle.
    pub core_threads: usize,
    /// Upper bound on concurrently executing work units.
    pub max_threads: usize,
    /// How long surplus idle threads linger.
    pub keep_alive: Duration,
    /// Work units that may wait for a free thread. Submission fails once
    /// `max_threads` are busy and this many are waiting.
    pub queue_length: usize,
    pub thread_group: String,
    pub thread_name_prefix: String,
}

impl PoolConfig {
    /// Defaults for the general-purpose pool.
    #[must_use]
    pub fn general() -> Self {
        Self {
            core_threads: 20,
            max_threads: 100,
            keep_alive: Duration::from_secs(5),
            queue_length: 4096,
            thread_group: "mediation-thread-group".to_string(),
            thread_name_prefix: "MediationWorker".to_string(),
        }
    }

    /// Defaults for the inbound pool.
    #[must_use]
    pub fn inbound() -> Self {
        Self {
            core_threads: 20,
            max_threads: 100,
            keep_alive: Duration::from_secs(5),
            queue_length: 10,
            thread_group: "inbound-thread-group".to_string(),
            thread_name_prefix: "InboundWorker".to_string(),
        }
    }

    /// Overlay properties onto `defaults`, field by field.
    #[must_use]
    pub fn resolve(defaults: Self, keys: &PoolKeys, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let max_threads = parse_positive(&lookup, keys.max_threads, defaults.max_threads);
        let mut core_threads = parse_positive(&lookup, keys.core_threads, defaults.core_threads);
        if core_threads > max_threads {
            warn!(
                core_threads,
                max_threads, "core thread count exceeds max thread count, clamping"
            );
            core_threads = max_threads;
        }

        Self {
            core_threads,
            max_threads,
            keep_alive: Duration::from_secs(parse_or(
                &lookup,
                keys.keep_alive_secs,
                defaults.keep_alive.as_secs(),
            )),
            queue_length: parse_or(&lookup, keys.queue_length, defaults.queue_length),
            thread_group: lookup(keys.thread_group).unwrap_or(defaults.thread_group),
            thread_name_prefix: lookup(keys.thread_name_prefix).unwrap_or(defaults.thread_name_prefix),
        }
    }

    /// Work units the pool accepts before rejecting: running plus queued.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_threads.saturating_add(self.queue_length)
    }
}

/// Everything the environment reads from configuration at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub general_pool: PoolConfig,
    pub inbound_pool: PoolConfig,
    pub global_timeout: Duration,
}

impl EnvironmentConfig {
    /// Resolve from a configuration registry's properties.
    #[must_use]
    pub fn from_registry(registry: &dyn ConfigurationRegistry) -> Self {
        Self::from_lookup(|key| registry.property(key))
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            general_pool: PoolConfig::resolve(PoolConfig::general(), &GENERAL_POOL_KEYS, &lookup),
            inbound_pool: PoolConfig::resolve(PoolConfig::inbound(), &INBOUND_POOL_KEYS, &lookup),
            global_timeout: Duration::from_millis(parse_or(
                &lookup,
                GLOBAL_TIMEOUT_KEY,
                DEFAULT_GLOBAL_TIMEOUT_MS,
            )),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            general_pool: PoolConfig::general(),
            inbound_pool: PoolConfig::inbound(),
            global_timeout: Duration::from_millis(DEFAULT_GLOBAL_TIMEOUT_MS),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    if let Ok(value) = raw.trim().parse() {
        value
    } else {
        warn!(key, value = %raw, "invalid tuning value, using default");
        default
    }
}

/// Like `parse_or`, but zero also counts as invalid.
fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    match parse_or(lookup, key, default) {
        0 => {
            warn!(key, "thread count must be positive, using default");
            default
        }
        value => value,
    }
}
