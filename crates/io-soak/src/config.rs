//! IO soak configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default; values that are present but malformed are rejected.

use crate::duty_cycle::DutyCycleTable;
use crate::platform::ShareProtocol;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default run-phase duration in seconds.
pub const DEFAULT_DURATION_SECONDS: u64 = 60;

/// Default per-job readiness allowance in seconds.
pub const DEFAULT_POD_READY_SECONDS: u64 = 20;

/// Default extra wait for run signals after the soak duration, in seconds.
pub const DEFAULT_SIGNAL_GRACE_SECONDS: u64 = 60;

/// Default delay before a disruptor kills its fio process, in seconds.
pub const DEFAULT_FAULT_AFTER_SECONDS: u64 = 51;

/// Default volume size.
pub const DEFAULT_VOLUME_SIZE_MB: u64 = 500;

/// Default fio file size on filesystem volumes.
pub const DEFAULT_FIO_SIZE_MB: u64 = 400;

/// Default namespace for soak jobs.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default isolation namespace for disruptor jobs.
pub const DEFAULT_DISRUPTOR_NAMESPACE: &str = "disrupt";

/// Default placement constraint for workload instances.
pub const DEFAULT_NODE_SELECTOR: &str = "e2e-app=true";

/// IO soak configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Share protocols; one storage class is created per protocol and job kind.
    pub protocols: Vec<ShareProtocol>,

    /// Replica count for every storage class.
    pub replicas: u32,

    /// Number of storage nodes hosting volumes.
    pub storage_nodes: usize,

    /// Soak jobs per storage node.
    pub load_factor: usize,

    /// Run-phase duration.
    pub duration: Duration,

    /// Number of disruptor jobs (0 disables disruptors).
    pub disruptor_count: usize,

    /// Delay before each disruptor faults.
    pub fault_after: Duration,

    /// Cyclic think-time table.
    pub duty_cycles: DutyCycleTable,

    /// Readiness allowance per job.
    pub pod_ready_allowance: Duration,

    /// Extra time to wait for run signals after `duration`.
    pub signal_grace: Duration,

    /// Container registry hosting the fio image.
    pub registry: String,

    /// Placement constraint shared by every workload instance.
    pub node_selector: BTreeMap<String, String>,

    /// Namespace for soak jobs.
    pub namespace: String,

    /// Isolation namespace for disruptor jobs.
    pub disruptor_namespace: String,

    pub volume_size_mb: u64,

    pub fio_size_mb: u64,

    /// `kubectl` binary.
    pub kubectl: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let protocols = vars
            .get("SOAK_PROTOCOLS")
            .map(String::as_str)
            .unwrap_or("nvmf")
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                p.parse()
                    .map_err(|e| ConfigError::InvalidValue(format!("SOAK_PROTOCOLS: {e}")))
            })
            .collect::<Result<Vec<ShareProtocol>, _>>()?;

        if protocols.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SOAK_PROTOCOLS must name at least one protocol".to_string(),
            ));
        }

        let replicas = parse_or(vars, "SOAK_REPLICAS", 1)?;
        let storage_nodes = parse_or(vars, "SOAK_STORAGE_NODES", 1)?;
        let load_factor = parse_or(vars, "SOAK_LOAD_FACTOR", 2)?;
        let duration = Duration::from_secs(parse_or(
            vars,
            "SOAK_DURATION_SECONDS",
            DEFAULT_DURATION_SECONDS,
        )?);
        let disruptor_count = parse_or(vars, "SOAK_DISRUPTOR_COUNT", 0)?;
        let fault_after = Duration::from_secs(parse_or(
            vars,
            "SOAK_FAULT_AFTER_SECONDS",
            DEFAULT_FAULT_AFTER_SECONDS,
        )?);
        let pod_ready_allowance = Duration::from_secs(parse_or(
            vars,
            "SOAK_POD_READY_SECONDS",
            DEFAULT_POD_READY_SECONDS,
        )?);
        let signal_grace = Duration::from_secs(parse_or(
            vars,
            "SOAK_SIGNAL_GRACE_SECONDS",
            DEFAULT_SIGNAL_GRACE_SECONDS,
        )?);

        let duty_cycles = match vars.get("SOAK_DUTY_CYCLES") {
            Some(list) => DutyCycleTable::parse(list)
                .map_err(|e| ConfigError::InvalidValue(format!("SOAK_DUTY_CYCLES: {e}")))?,
            None => DutyCycleTable::default(),
        };

        let node_selector = parse_selector(
            vars.get("SOAK_NODE_SELECTOR")
                .map(String::as_str)
                .unwrap_or(DEFAULT_NODE_SELECTOR),
        )?;

        let registry = vars
            .get("SOAK_REGISTRY")
            .cloned()
            .unwrap_or_else(|| "docker.io".to_string());

        let namespace = vars
            .get("SOAK_NAMESPACE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let disruptor_namespace = vars
            .get("SOAK_DISRUPTOR_NAMESPACE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DISRUPTOR_NAMESPACE.to_string());

        if disruptor_count > 0 && disruptor_namespace == namespace {
            return Err(ConfigError::InvalidValue(format!(
                "SOAK_DISRUPTOR_NAMESPACE must differ from SOAK_NAMESPACE ({namespace})"
            )));
        }

        let volume_size_mb = parse_or(vars, "SOAK_VOLUME_SIZE_MB", DEFAULT_VOLUME_SIZE_MB)?;
        let fio_size_mb = parse_or(vars, "SOAK_FIO_SIZE_MB", DEFAULT_FIO_SIZE_MB)?;

        if fio_size_mb >= volume_size_mb {
            return Err(ConfigError::InvalidValue(format!(
                "SOAK_FIO_SIZE_MB ({fio_size_mb}) must be smaller than SOAK_VOLUME_SIZE_MB ({volume_size_mb})"
            )));
        }

        let kubectl = vars
            .get("SOAK_KUBECTL")
            .cloned()
            .unwrap_or_else(|| "kubectl".to_string());

        Ok(Config {
            protocols,
            replicas,
            storage_nodes,
            load_factor,
            duration,
            disruptor_count,
            fault_after,
            duty_cycles,
            pod_ready_allowance,
            signal_grace,
            registry,
            node_selector,
            namespace,
            disruptor_namespace,
            volume_size_mb,
            fio_size_mb,
            kubectl,
        })
    }

    /// Number of soak (non-disruptor) jobs.
    pub fn soak_job_count(&self) -> usize {
        self.storage_nodes.saturating_mul(self.load_factor)
    }

    /// fio image reference.
    pub fn fio_image(&self) -> String {
        format!("{}/mayastor/e2e-fio", self.registry)
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("{key}='{raw}': {e}"))),
        None => Ok(default),
    }
}

/// Parse `key=value[,key=value]` into a placement selector.
fn parse_selector(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ConfigError::InvalidValue(format!("SOAK_NODE_SELECTOR entry '{pair}' is not key=value"))
            })?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::duty_cycle::DutyCycle;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.protocols, vec![ShareProtocol::Nvmf]);
        assert_eq!(config.replicas, 1);
        assert_eq!(config.soak_job_count(), 2);
        assert_eq!(config.duration, Duration::from_secs(DEFAULT_DURATION_SECONDS));
        assert_eq!(config.disruptor_count, 0);
        assert_eq!(
            config.fault_after,
            Duration::from_secs(DEFAULT_FAULT_AFTER_SECONDS)
        );
        assert!(config.duty_cycles.is_empty());
        assert_eq!(
            config.pod_ready_allowance,
            Duration::from_secs(DEFAULT_POD_READY_SECONDS)
        );
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.disruptor_namespace, DEFAULT_DISRUPTOR_NAMESPACE);
        assert_eq!(config.node_selector.get("e2e-app").map(String::as_str), Some("true"));
        assert_eq!(config.fio_image(), "docker.io/mayastor/e2e-fio");
        assert_eq!(config.kubectl, "kubectl");
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("SOAK_PROTOCOLS".to_string(), "nvmf,iscsi".to_string()),
            ("SOAK_REPLICAS".to_string(), "3".to_string()),
            ("SOAK_STORAGE_NODES".to_string(), "3".to_string()),
            ("SOAK_LOAD_FACTOR".to_string(), "4".to_string()),
            ("SOAK_DURATION_SECONDS".to_string(), "600".to_string()),
            ("SOAK_DISRUPTOR_COUNT".to_string(), "2".to_string()),
            ("SOAK_FAULT_AFTER_SECONDS".to_string(), "10".to_string()),
            ("SOAK_DUTY_CYCLES".to_string(), "1:1000,500:8".to_string()),
            ("SOAK_REGISTRY".to_string(), "ci-registry:5000".to_string()),
            (
                "SOAK_NODE_SELECTOR".to_string(),
                "role=app, zone=a".to_string(),
            ),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(
            config.protocols,
            vec![ShareProtocol::Nvmf, ShareProtocol::Iscsi]
        );
        assert_eq!(config.replicas, 3);
        assert_eq!(config.soak_job_count(), 12);
        assert_eq!(config.duration, Duration::from_secs(600));
        assert_eq!(config.disruptor_count, 2);
        assert_eq!(config.fault_after, Duration::from_secs(10));
        assert_eq!(
            config.duty_cycles.select(1),
            DutyCycle {
                think_time: 500,
                think_time_blocks: 8
            }
        );
        assert_eq!(config.fio_image(), "ci-registry:5000/mayastor/e2e-fio");
        assert_eq!(config.node_selector.len(), 2);
        assert_eq!(config.node_selector.get("zone").map(String::as_str), Some("a"));
    }

    #[test]
    fn test_from_vars_rejects_bad_number() {
        let vars = HashMap::from([("SOAK_DURATION_SECONDS".to_string(), "ten".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("SOAK_DURATION_SECONDS"))
        );
    }

    #[test]
    fn test_from_vars_rejects_unknown_protocol() {
        let vars = HashMap::from([("SOAK_PROTOCOLS".to_string(), "nvmf,nbd".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_empty_protocol_list() {
        let vars = HashMap::from([("SOAK_PROTOCOLS".to_string(), " , ".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_malformed_duty_cycles() {
        let vars = HashMap::from([("SOAK_DUTY_CYCLES".to_string(), "1000".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("SOAK_DUTY_CYCLES")
        ));
    }

    #[test]
    fn test_from_vars_rejects_shared_disruptor_namespace() {
        let vars = HashMap::from([
            ("SOAK_DISRUPTOR_COUNT".to_string(), "1".to_string()),
            ("SOAK_DISRUPTOR_NAMESPACE".to_string(), "default".to_string()),
        ]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_fio_file_larger_than_volume() {
        let vars = HashMap::from([
            ("SOAK_VOLUME_SIZE_MB".to_string(), "100".to_string()),
            ("SOAK_FIO_SIZE_MB".to_string(), "100".to_string()),
        ]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_malformed_selector() {
        let vars = HashMap::from([("SOAK_NODE_SELECTOR".to_string(), "role".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
