use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// MQTT broker the device should report to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
}

/// Everything needed to provision the selected device.
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    pub ssid: String,
    pub secret: SecretString,
    /// Broker writes are skipped when absent.
    pub broker: Option<BrokerConfig>,
}

impl ProvisioningRequest {
    pub fn new(ssid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            secret: SecretString::from(secret.into()),
            broker: None,
        }
    }

    pub fn with_broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.broker = Some(BrokerConfig {
            host: host.into(),
            port,
        });
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |message: &str| {
            Err(CoreError::ValidationFailed {
                message: message.into(),
            })
        };

        if self.ssid.trim().is_empty() {
            return invalid("network name must not be empty");
        }
        // 802.11 limit.
        if self.ssid.len() > 32 {
            return invalid("network name must be at most 32 bytes");
        }
        if self.secret.expose_secret().is_empty() {
            return invalid("network secret must not be empty");
        }
        if let Some(broker) = &self.broker {
            if broker.host.trim().is_empty() {
                return invalid("broker host must not be empty");
            }
            if broker.port == 0 {
                return invalid("broker port must be non-zero");
            }
        }
        Ok(())
    }
}
