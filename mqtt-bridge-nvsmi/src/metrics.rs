//! Static descriptor table for the `dmon` metric columns.
//!
//! Covers every column `dmon -s pucvmet` can emit. Columns without an
//! applicable Home Assistant device class (plain utilization percentages,
//! ECC error counts) leave it unset and are discovered as generic sensors.

/// Description of one metric column for discovery purposes.
#[derive(Debug, Clone, Copy)]
pub struct MetricDescriptor {
    /// Human-readable sensor name.
    pub name: &'static str,
    /// Home Assistant device class, when one applies.
    pub device_class: Option<&'static str>,
    /// Unit of measurement.
    pub unit: &'static str,
}

/// Known metric columns, keyed by the header name `dmon` reports.
pub const METRICS: &[(&str, MetricDescriptor)] = &[
    ("pwr", MetricDescriptor { name: "Power Usage", device_class: Some("power"), unit: "W" }),
    ("gtemp", MetricDescriptor { name: "GPU Temp", device_class: Some("temperature"), unit: "°C" }),
    ("mtemp", MetricDescriptor { name: "Memory Temp", device_class: Some("temperature"), unit: "°C" }),
    ("sm", MetricDescriptor { name: "SM Util", device_class: None, unit: "%" }),
    ("mem", MetricDescriptor { name: "Memory Util", device_class: None, unit: "%" }),
    ("enc", MetricDescriptor { name: "Encoder Util", device_class: None, unit: "%" }),
    ("dec", MetricDescriptor { name: "Decoder Util", device_class: None, unit: "%" }),
    ("jpg", MetricDescriptor { name: "JPEG Util", device_class: None, unit: "%" }),
    ("ofa", MetricDescriptor { name: "Optical Flow Util", device_class: None, unit: "%" }),
    ("mclk", MetricDescriptor { name: "Memory Clock", device_class: Some("frequency"), unit: "MHz" }),
    ("pclk", MetricDescriptor { name: "Processor Clock", device_class: Some("frequency"), unit: "MHz" }),
    ("pviol", MetricDescriptor { name: "Power Violation", device_class: None, unit: "%" }),
    ("tviol", MetricDescriptor { name: "Thermal Violation", device_class: None, unit: "bool" }),
    ("fb", MetricDescriptor { name: "FB Memory Usage", device_class: Some("data_size"), unit: "MB" }),
    ("bar1", MetricDescriptor { name: "BAR1 Memory Usage", device_class: Some("data_size"), unit: "MB" }),
    ("ccpm", MetricDescriptor { name: "CCPM Memory Usage", device_class: Some("data_size"), unit: "MB" }),
    ("sbecc", MetricDescriptor { name: "Single Bit ECC Errors", device_class: None, unit: "errs" }),
    ("dbecc", MetricDescriptor { name: "Double Bit ECC Errors", device_class: None, unit: "errs" }),
    ("pci", MetricDescriptor { name: "PCI Throughput", device_class: Some("data_rate"), unit: "MB/s" }),
    ("rxpci", MetricDescriptor { name: "PCI RX", device_class: Some("data_rate"), unit: "MB/s" }),
    ("txpci", MetricDescriptor { name: "PCI TX", device_class: Some("data_rate"), unit: "MB/s" }),
];

/// Look up the descriptor for a column key.
pub fn descriptor(key: &str) -> Option<&'static MetricDescriptor> {
    METRICS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, desc)| desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_lookup() {
        let pwr = descriptor("pwr").unwrap();
        assert_eq!(pwr.name, "Power Usage");
        assert_eq!(pwr.device_class, Some("power"));
        assert_eq!(pwr.unit, "W");

        let sm = descriptor("sm").unwrap();
        assert!(sm.device_class.is_none());

        assert!(descriptor("nonexistent").is_none());
    }

    #[test]
    fn test_keys_are_unique() {
        for (i, (key, _)) in METRICS.iter().enumerate() {
            assert!(
                METRICS.iter().skip(i + 1).all(|(other, _)| other != key),
                "duplicate metric key: {key}"
            );
        }
    }
}
