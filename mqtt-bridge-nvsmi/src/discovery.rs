//! Home Assistant MQTT discovery publishing.
//!
//! For every enumerated GPU and every known metric column, the bridge
//! publishes a retained config message the platform turns into a typed
//! sensor entity. All config messages go out before the retained `online`
//! availability message, so a subscriber never observes an available bridge
//! without its entity configuration.

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;

use crate::error::{BridgeError, Result};
use crate::gpu::Gpu;
use crate::metrics::{METRICS, MetricDescriptor};
use crate::topics::Topics;

/// Availability payload for a running bridge.
pub const AVAILABILITY_ONLINE: &str = "online";
/// Availability payload for a stopped bridge; also the last-will payload.
pub const AVAILABILITY_OFFLINE: &str = "offline";

/// `device` block tying every sensor of one GPU together in the platform's
/// device registry.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub identifiers: Vec<String>,
    pub manufacturer: &'static str,
    pub model: String,
}

/// Discovery config payload for a single sensor entity.
#[derive(Debug, Clone, Serialize)]
pub struct SensorConfig {
    pub device: DeviceInfo,
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    pub unit_of_measurement: &'static str,
    pub value_template: String,
    pub unique_id: String,
    pub state_class: &'static str,
    pub expire_after: u32,
    pub enabled_by_default: bool,
    pub availability_topic: String,
    pub state_topic: String,
}

/// Build the retained config message for every metric of every GPU.
pub fn config_messages(gpus: &[Gpu], topics: &Topics) -> Vec<(String, SensorConfig)> {
    let mut messages = Vec::with_capacity(gpus.len() * METRICS.len());
    for gpu in gpus {
        for (key, descriptor) in METRICS {
            messages.push((
                topics.sensor_config(&gpu.uuid, key),
                sensor_config(gpu, key, descriptor, topics),
            ));
        }
    }
    messages
}

fn sensor_config(
    gpu: &Gpu,
    key: &str,
    descriptor: &MetricDescriptor,
    topics: &Topics,
) -> SensorConfig {
    SensorConfig {
        device: DeviceInfo {
            name: gpu.name.clone(),
            identifiers: vec![gpu.uuid.clone()],
            manufacturer: "NVIDIA",
            model: gpu.name.clone(),
        },
        name: descriptor.name,
        device_class: descriptor.device_class,
        unit_of_measurement: descriptor.unit,
        value_template: format!("{{{{ value_json.{key} }}}}"),
        unique_id: format!("{}_{}", gpu.uuid, key),
        state_class: "measurement",
        expire_after: 60,
        enabled_by_default: true,
        availability_topic: topics.availability(),
        state_topic: topics.state(&gpu.uuid),
    }
}

/// Publish every config message retained, then assert `online` availability.
///
/// Safe to call repeatedly; retained broker state is simply re-asserted.
pub async fn publish(client: &AsyncClient, gpus: &[Gpu], topics: &Topics) -> Result<()> {
    let messages = config_messages(gpus, topics);
    let count = messages.len();

    for (topic, payload) in messages {
        let body = serde_json::to_vec(&payload)?;
        client
            .publish(topic.as_str(), QoS::AtLeastOnce, true, body)
            .await
            .map_err(|e| BridgeError::Publish {
                topic,
                message: e.to_string(),
            })?;
    }

    let availability = topics.availability();
    client
        .publish(availability.as_str(), QoS::AtLeastOnce, true, AVAILABILITY_ONLINE)
        .await
        .map_err(|e| BridgeError::Publish {
            topic: availability,
            message: e.to_string(),
        })?;

    tracing::info!(sensors = count, gpus = gpus.len(), "published discovery configuration");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::descriptor;

    fn gpu() -> Gpu {
        Gpu {
            index: 0,
            name: "NVIDIA GeForce RTX 3080".to_string(),
            uuid: "GPU-aaaa".to_string(),
        }
    }

    #[test]
    fn test_one_config_per_gpu_and_metric() {
        let gpus = vec![
            gpu(),
            Gpu { index: 1, name: "NVIDIA T400".to_string(), uuid: "GPU-bbbb".to_string() },
        ];
        let topics = Topics::new("nvidia-smi", "homeassistant");

        let messages = config_messages(&gpus, &topics);

        assert_eq!(messages.len(), gpus.len() * METRICS.len());
    }

    #[test]
    fn test_config_payload_shape() {
        let topics = Topics::new("nvidia-smi", "homeassistant");
        let messages = config_messages(&[gpu()], &topics);

        let (topic, config) = messages
            .iter()
            .find(|(_, c)| c.unique_id == "GPU-aaaa_pwr")
            .unwrap();

        assert_eq!(topic, "homeassistant/sensor/GPU-aaaa_pwr/config");

        let json = serde_json::to_value(config).unwrap();
        assert_eq!(json["device"]["name"], "NVIDIA GeForce RTX 3080");
        assert_eq!(json["device"]["identifiers"][0], "GPU-aaaa");
        assert_eq!(json["device"]["manufacturer"], "NVIDIA");
        assert_eq!(json["name"], descriptor("pwr").unwrap().name);
        assert_eq!(json["device_class"], "power");
        assert_eq!(json["unit_of_measurement"], "W");
        assert_eq!(json["value_template"], "{{ value_json.pwr }}");
        assert_eq!(json["state_class"], "measurement");
        assert_eq!(json["expire_after"], 60);
        assert_eq!(json["enabled_by_default"], true);
        assert_eq!(json["availability_topic"], "nvidia-smi/availability");
        assert_eq!(json["state_topic"], "nvidia-smi/GPU-aaaa");
    }

    #[test]
    fn test_device_class_omitted_when_absent() {
        let topics = Topics::new("nvidia-smi", "homeassistant");
        let messages = config_messages(&[gpu()], &topics);

        let (_, config) = messages
            .iter()
            .find(|(_, c)| c.unique_id == "GPU-aaaa_sm")
            .unwrap();

        let json = serde_json::to_value(config).unwrap();
        assert!(json.get("device_class").is_none());
    }
}
