use crate::cluster::{DEFAULT_NUM_SLOTS, DEFAULT_VIRTUAL_REPLICAS};
use crate::core::{Result, RouterError};
use crate::router::KeyDerivation;
use crate::supervisor::DockerSettings;
use clap::{Parser, ValueEnum};
use std::time::Duration;

/// Which [`crate::supervisor::WorkerSupervisor`] backs the replica pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SupervisorKind {
    /// In-process HTTP workers on loopback ports.
    Local,
    /// One docker container per worker.
    Docker,
}

/// Router configuration
///
/// Every option can also be given through the environment variable shown in `--help`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "hashring-router",
    version,
    about = "Consistent-hashing request router with online replica scaling"
)]
pub struct RouterConfig {
    /// Address the control and routing endpoints bind to
    #[arg(long, env = "ROUTER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the control and routing endpoints bind to
    #[arg(long, env = "ROUTER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Size of the ring slot space
    #[arg(long, env = "RING_NUM_SLOTS", default_value_t = DEFAULT_NUM_SLOTS)]
    pub num_slots: u64,

    /// Virtual nodes per replica
    #[arg(long, env = "RING_VIRTUAL_REPLICAS", default_value_t = DEFAULT_VIRTUAL_REPLICAS)]
    pub virtual_replicas: u32,

    /// Replicas started at boot, named Server1..ServerN
    #[arg(long, env = "INITIAL_REPLICAS", default_value_t = 3)]
    pub initial_replicas: usize,

    /// How long a new replica may take to answer its heartbeat
    #[arg(long, env = "READINESS_TIMEOUT_MS", default_value_t = 10_000)]
    pub readiness_timeout_ms: u64,

    /// Upper bound for one forwarded request
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 5_000)]
    pub request_timeout_ms: u64,

    /// Delay between heartbeat probes of a starting replica
    #[arg(long, env = "HEARTBEAT_INTERVAL_MS", default_value_t = 200)]
    pub heartbeat_interval_ms: u64,

    /// Worker supervisor backend
    #[arg(long, env = "SUPERVISOR", value_enum, default_value_t = SupervisorKind::Local)]
    pub supervisor: SupervisorKind,

    /// Docker image running the worker (docker supervisor)
    #[arg(long, env = "WORKER_IMAGE", default_value = "ds-server")]
    pub worker_image: String,

    /// Docker network shared with the workers (docker supervisor)
    #[arg(long, env = "WORKER_NETWORK", default_value = "net1")]
    pub worker_network: String,

    /// Port workers listen on inside their containers (docker supervisor)
    #[arg(long, env = "WORKER_PORT", default_value_t = 5000)]
    pub worker_port: u16,

    /// How request keys are derived
    #[arg(long, env = "KEY_DERIVATION", value_enum, default_value_t = KeyDerivation::Ephemeral)]
    pub key_derivation: KeyDerivation,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            num_slots: DEFAULT_NUM_SLOTS,
            virtual_replicas: DEFAULT_VIRTUAL_REPLICAS,
            initial_replicas: 3,
            readiness_timeout_ms: 10_000,
            request_timeout_ms: 5_000,
            heartbeat_interval_ms: 200,
            supervisor: SupervisorKind::Local,
            worker_image: "ds-server".to_string(),
            worker_network: "net1".to_string(),
            worker_port: 5000,
            key_derivation: KeyDerivation::Ephemeral,
        }
    }
}

impl RouterConfig {
    /// Set the ring geometry
    pub fn ring(mut self, num_slots: u64, virtual_replicas: u32) -> Self {
        self.num_slots = num_slots;
        self.virtual_replicas = virtual_replicas;
        self
    }

    /// Set the number of replicas started at boot
    pub fn initial_replicas(mut self, count: usize) -> Self {
        self.initial_replicas = count;
        self
    }

    /// Set readiness timeout
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn key_derivation(mut self, key_derivation: KeyDerivation) -> Self {
        self.key_derivation = key_derivation;
        self
    }

    pub fn readiness_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval_duration(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn docker_settings(&self) -> DockerSettings {
        DockerSettings {
            image: self.worker_image.clone(),
            network: self.worker_network.clone(),
            worker_port: self.worker_port,
            request_timeout: self.request_timeout_duration(),
            ..DockerSettings::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_slots == 0 {
            return Err(RouterError::Config("num_slots must be > 0".to_string()));
        }
        if self.virtual_replicas == 0 {
            return Err(RouterError::Config(
                "virtual_replicas must be > 0".to_string(),
            ));
        }
        if u64::from(self.virtual_replicas) > self.num_slots {
            return Err(RouterError::Config(
                "virtual_replicas cannot exceed num_slots".to_string(),
            ));
        }
        if (self.initial_replicas as u64).saturating_mul(u64::from(self.virtual_replicas))
            > self.num_slots
        {
            return Err(RouterError::Config(
                "initial replicas do not fit on the ring".to_string(),
            ));
        }
        if self.readiness_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(RouterError::Config("timeouts must be > 0".to_string()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(RouterError::Config(
                "heartbeat_interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.num_slots, 104_729);
        assert_eq!(config.virtual_replicas, 500);
        assert_eq!(config.initial_replicas, 3);
        assert_eq!(config.address(), "0.0.0.0:5000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_matches_default() {
        let parsed = RouterConfig::try_parse_from(["hashring-router"]).unwrap();
        let default = RouterConfig::default();
        assert_eq!(parsed.num_slots, default.num_slots);
        assert_eq!(parsed.port, default.port);
        assert_eq!(parsed.supervisor, SupervisorKind::Local);
        assert_eq!(parsed.key_derivation, KeyDerivation::Ephemeral);
    }

    #[test]
    fn test_parse_flags() {
        let parsed = RouterConfig::try_parse_from([
            "hashring-router",
            "--port",
            "8080",
            "--supervisor",
            "docker",
            "--key-derivation",
            "path",
            "--num-slots",
            "1009",
        ])
        .unwrap();
        assert_eq!(parsed.port, 8080);
        assert_eq!(parsed.supervisor, SupervisorKind::Docker);
        assert_eq!(parsed.key_derivation, KeyDerivation::Path);
        assert_eq!(parsed.num_slots, 1009);
    }

    #[test]
    fn test_builder_pattern() {
        let config = RouterConfig::default()
            .ring(1009, 20)
            .initial_replicas(2)
            .request_timeout(Duration::from_millis(250));
        assert_eq!(config.num_slots, 1009);
        assert_eq!(config.virtual_replicas, 20);
        assert_eq!(config.request_timeout_duration(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(RouterConfig::default().ring(0, 1).validate().is_err());
        assert!(RouterConfig::default().ring(10, 0).validate().is_err());
        assert!(RouterConfig::default().ring(10, 11).validate().is_err());
        assert!(
            RouterConfig::default()
                .ring(100, 40)
                .initial_replicas(3)
                .validate()
                .is_err()
        );
        assert!(
            RouterConfig::default()
                .readiness_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
