//! Operator configuration, read from the environment at startup

use crate::controller::resource::RetryConfig;
use crate::ipam::split::ZONE_SPLIT_BITS;
use crate::ipam::IpamConfig;
use ipnet::Ipv4Net;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_IPAM_NETWORK: &str = "STRATO_IPAM_NETWORK";
pub const ENV_IPAM_CLUSTER_PREFIX: &str = "STRATO_IPAM_CLUSTER_PREFIX";
pub const ENV_IPAM_NODEPOOL_PREFIX: &str = "STRATO_IPAM_NODEPOOL_PREFIX";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "STRATO_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_INITIAL_DELAY_MS: &str = "STRATO_RETRY_INITIAL_DELAY_MS";
pub const ENV_HEALTH_PORT: &str = "STRATO_HEALTH_PORT";
pub const ENV_CLOUD_ENDPOINT: &str = "STRATO_CLOUD_ENDPOINT";

const DEFAULT_IPAM_NETWORK: &str = "10.100.0.0/16";
const DEFAULT_PREFIX: u8 = 24;
const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_LEASE_NAMESPACE: &str = "strato-system";

/// Bits a range is split by: the zone children plus the public/private halves
pub const RANGE_SPLIT_BITS: u8 = ZONE_SPLIT_BITS + 1;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("{0} must be set")]
    Missing(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Shared network cluster and node pool ranges are taken from
    pub ipam_network: Ipv4Net,
    pub cluster_prefix: u8,
    pub node_pool_prefix: u8,
    pub retry: RetryConfig,
    pub health_port: u16,
    /// Base URL of the cloud gateway
    pub cloud_endpoint: String,
    /// Identity written into IPAM lock leases
    pub holder_id: String,
    /// Namespace IPAM lock leases live in
    pub lease_namespace: String,
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("{:?}: {}", raw, e),
        }),
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default_network: Ipv4Net =
            DEFAULT_IPAM_NETWORK
                .parse()
                .map_err(|e: ipnet::AddrParseError| ConfigError::Invalid {
                    key: ENV_IPAM_NETWORK.to_string(),
                    reason: e.to_string(),
                })?;

        let max_attempts: u32 = parse(&lookup, ENV_RETRY_MAX_ATTEMPTS, 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_RETRY_MAX_ATTEMPTS.to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        let initial_delay_ms: u64 = parse(&lookup, ENV_RETRY_INITIAL_DELAY_MS, 200)?;

        let cloud_endpoint = lookup(ENV_CLOUD_ENDPOINT)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing(ENV_CLOUD_ENDPOINT.to_string()))?;

        let holder_id = lookup("POD_NAME")
            .or_else(|| lookup("HOSTNAME"))
            .unwrap_or_else(|| format!("strato-{}", uuid::Uuid::new_v4()));

        let config = OperatorConfig {
            ipam_network: parse(&lookup, ENV_IPAM_NETWORK, default_network)?,
            cluster_prefix: parse(&lookup, ENV_IPAM_CLUSTER_PREFIX, DEFAULT_PREFIX)?,
            node_pool_prefix: parse(&lookup, ENV_IPAM_NODEPOOL_PREFIX, DEFAULT_PREFIX)?,
            retry: RetryConfig {
                max_attempts,
                initial_delay: Duration::from_millis(initial_delay_ms),
                ..Default::default()
            },
            health_port: parse(&lookup, ENV_HEALTH_PORT, DEFAULT_HEALTH_PORT)?,
            cloud_endpoint,
            holder_id,
            lease_namespace: lookup("POD_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_LEASE_NAMESPACE.to_string()),
        };

        for (key, ipam) in [
            (ENV_IPAM_CLUSTER_PREFIX, config.cluster_ipam()),
            (ENV_IPAM_NODEPOOL_PREFIX, config.node_pool_ipam()),
        ] {
            ipam.validate().map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(config)
    }

    pub fn cluster_ipam(&self) -> IpamConfig {
        IpamConfig {
            network: self.ipam_network,
            prefix_len: self.cluster_prefix,
            split_bits: RANGE_SPLIT_BITS,
        }
    }

    pub fn node_pool_ipam(&self) -> IpamConfig {
        IpamConfig {
            network: self.ipam_network,
            prefix_len: self.node_pool_prefix,
            split_bits: RANGE_SPLIT_BITS,
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
