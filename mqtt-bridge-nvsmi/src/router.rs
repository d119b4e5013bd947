//! Correlates decoded samples with the enumerated GPUs.

use crate::gpu::Gpu;
use crate::stream::Sample;
use crate::topics::Topics;

/// Resolve a sample against the startup GPU list and build its state
/// publication.
///
/// The index column arrives as text, so the comparison is string-normalized
/// rather than numeric. A sample whose index matches no enumerated GPU is
/// dropped: the device list is fixed at startup.
pub fn route(sample: &Sample, gpus: &[Gpu], topics: &Topics) -> Option<(String, Vec<u8>)> {
    let gpu = gpus
        .iter()
        .find(|gpu| gpu.index.to_string() == sample.device_index)?;
    let payload = serde_json::to_vec(sample).ok()?;
    Some((topics.state(&gpu.uuid), payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FieldValue;

    fn gpus() -> Vec<Gpu> {
        vec![
            Gpu { index: 0, name: "RTX 3080".to_string(), uuid: "GPU-aaaa".to_string() },
            Gpu { index: 1, name: "RTX 3090".to_string(), uuid: "GPU-bbbb".to_string() },
        ]
    }

    fn sample(index: &str) -> Sample {
        Sample {
            device_index: index.to_string(),
            fields: vec![("pwr".to_string(), FieldValue::Number(45.2))],
        }
    }

    #[test]
    fn test_route_to_matching_gpu() {
        let topics = Topics::new("nvidia-smi", "homeassistant");
        let (topic, payload) = route(&sample("1"), &gpus(), &topics).unwrap();

        assert_eq!(topic, "nvidia-smi/GPU-bbbb");
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&payload).unwrap(),
            serde_json::json!({ "pwr": 45.2 })
        );
    }

    #[test]
    fn test_unknown_index_dropped() {
        let topics = Topics::new("nvidia-smi", "homeassistant");

        assert!(route(&sample("7"), &gpus(), &topics).is_none());
        assert!(route(&sample("not-a-number"), &gpus(), &topics).is_none());
    }

    #[test]
    fn test_empty_device_list_drops_everything() {
        let topics = Topics::new("nvidia-smi", "homeassistant");

        assert!(route(&sample("0"), &[], &topics).is_none());
    }
}
