//! MQTT topic construction.
//!
//! Topic layout:
//! - `{base}/availability`: retained `online`/`offline`, also registered
//!   as the connection's last-will
//! - `{base}/{uuid}`: non-retained per-GPU sample payloads
//! - `{prefix}/sensor/{uuid}_{key}/config`: retained discovery configs
//! - `{prefix}/status`: platform birth topic; any message re-triggers
//!   discovery publishing

/// Builder for the bridge's MQTT topics.
#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
    discovery_prefix: String,
}

impl Topics {
    /// Create a topic builder from the configured prefixes.
    pub fn new(base: impl Into<String>, discovery_prefix: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            discovery_prefix: discovery_prefix.into(),
        }
    }

    /// Availability topic, shared by all GPUs.
    ///
    /// # Example
    /// ```
    /// use mqtt_bridge_nvsmi::topics::Topics;
    ///
    /// let topics = Topics::new("nvidia-smi", "homeassistant");
    /// assert_eq!(topics.availability(), "nvidia-smi/availability");
    /// ```
    pub fn availability(&self) -> String {
        format!("{}/availability", self.base)
    }

    /// State topic carrying one GPU's sample payloads.
    ///
    /// # Example
    /// ```
    /// use mqtt_bridge_nvsmi::topics::Topics;
    ///
    /// let topics = Topics::new("nvidia-smi", "homeassistant");
    /// assert_eq!(topics.state("GPU-abc"), "nvidia-smi/GPU-abc");
    /// ```
    pub fn state(&self, uuid: &str) -> String {
        format!("{}/{}", self.base, uuid)
    }

    /// Discovery config topic for one sensor entity.
    ///
    /// # Example
    /// ```
    /// use mqtt_bridge_nvsmi::topics::Topics;
    ///
    /// let topics = Topics::new("nvidia-smi", "homeassistant");
    /// assert_eq!(
    ///     topics.sensor_config("GPU-abc", "pwr"),
    ///     "homeassistant/sensor/GPU-abc_pwr/config"
    /// );
    /// ```
    pub fn sensor_config(&self, uuid: &str, key: &str) -> String {
        format!("{}/sensor/{}_{}/config", self.discovery_prefix, uuid, key)
    }

    /// Platform status topic the bridge subscribes to.
    pub fn platform_status(&self) -> String {
        format!("{}/status", self.discovery_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_prefixes() {
        let topics = Topics::new("gpu", "ha");

        assert_eq!(topics.availability(), "gpu/availability");
        assert_eq!(topics.state("GPU-1234"), "gpu/GPU-1234");
        assert_eq!(topics.sensor_config("GPU-1234", "gtemp"), "ha/sensor/GPU-1234_gtemp/config");
        assert_eq!(topics.platform_status(), "ha/status");
    }
}
