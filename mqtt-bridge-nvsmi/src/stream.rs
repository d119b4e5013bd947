//! Streaming parser for the `nvidia-smi dmon` CSV protocol.
//!
//! `dmon` writes two `# `-prefixed header rows (column keys, then units)
//! followed by an unbounded stream of comma-separated data rows, one per GPU
//! per sampling tick. Stdout chunks arrive with no alignment guarantee, so
//! the parser appends each chunk to a buffer and only decodes fully
//! terminated lines, keeping the trailing partial segment for the next feed.
//!
//! Malformed input is never fatal: rows that don't match the captured header
//! are dropped and the stream keeps going.
//!
//! Known limitation: header rows re-emitted mid-stream are ignored, so a
//! tool restart that reorders columns while the bridge keeps running would
//! misdecode rows until the bridge itself restarts.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Column key `dmon` uses for the device index.
pub const DEVICE_INDEX_KEY: &str = "gpu";

/// Sentinel `dmon` emits in place of a reading that doesn't apply.
const SENTINEL: &str = "-";

/// Upper bound on the buffered partial line. dmon lines are tens of bytes;
/// anything past this means the stream stopped terminating lines.
const MAX_PARTIAL_LINE: usize = 64 * 1024;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric reading.
    Number(f64),
    /// Non-numeric text, passed through verbatim.
    Text(String),
    /// The `-` sentinel.
    Null,
}

impl FieldValue {
    /// Coerce a raw field: sentinel to null, numeric text to a number,
    /// everything else verbatim.
    pub fn parse(raw: &str) -> Self {
        if raw == SENTINEL {
            return Self::Null;
        }
        match raw.parse::<f64>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(raw.to_string()),
        }
    }
}

/// One decoded data row.
///
/// The device index is extracted from the row's `gpu` column; the remaining
/// columns keep their row order in `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Device index as reported by dmon, kept as text for routing.
    pub device_index: String,
    /// Metric values keyed by column name, in row order.
    pub fields: Vec<(String, FieldValue)>,
}

// Samples serialize as the bare field map; the device index is routing
// metadata, not part of the published payload.
impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Incremental parser over the dmon stdout stream.
#[derive(Debug, Default)]
pub struct DmonParser {
    buf: String,
    columns: Option<Vec<String>>,
    units: Option<Vec<String>>,
}

impl DmonParser {
    /// Create a parser with no captured header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Column keys from the first header row, once seen.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Unit strings from the second header row, once seen. Captured for
    /// completeness; decoding matches columns by position only.
    pub fn units(&self) -> Option<&[String]> {
        self.units.as_deref()
    }

    /// Feed a chunk of stdout text, returning the samples decoded from
    /// every line the chunk completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<Sample> {
        self.buf.push_str(chunk);

        let mut samples = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            if let Some(sample) = self.accept_line(line.trim()) {
                samples.push(sample);
            }
        }

        if self.buf.len() > MAX_PARTIAL_LINE {
            tracing::warn!(
                len = self.buf.len(),
                "unterminated dmon line exceeded buffer bound, discarding"
            );
            self.buf.clear();
        }

        samples
    }

    /// Classify and decode one complete, trimmed line.
    fn accept_line(&mut self, line: &str) -> Option<Sample> {
        if line.is_empty() {
            return None;
        }

        if let Some(rest) = line.strip_prefix('#') {
            if self.columns.is_none() {
                self.columns = Some(split_fields(rest));
            } else if self.units.is_none() {
                self.units = Some(split_fields(rest));
            }
            // dmon repeats the header periodically; later copies are dropped
            return None;
        }

        // Data rows are undecodable until the first header row arrives
        let columns = self.columns.as_ref()?;

        let values = split_fields(line);
        if values.len() != columns.len() {
            tracing::debug!(
                expected = columns.len(),
                got = values.len(),
                "dropping row with unexpected field count"
            );
            return None;
        }

        let mut device_index = None;
        let mut fields = Vec::with_capacity(values.len().saturating_sub(1));
        for (key, raw) in columns.iter().zip(values) {
            if key == DEVICE_INDEX_KEY {
                device_index = Some(raw);
            } else {
                fields.push((key.clone(), FieldValue::parse(&raw)));
            }
        }

        Some(Sample {
            device_index: device_index?,
            fields,
        })
    }
}

/// Split a comma-separated line into whitespace-trimmed fields.
fn split_fields(line: &str) -> Vec<String> {
    line.split(',').map(|field| field.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut DmonParser, input: &str) -> Vec<Sample> {
        parser.feed(input)
    }

    #[test]
    fn test_decode_example_row() {
        let mut parser = DmonParser::new();
        let samples = feed_all(
            &mut parser,
            "# gpu, pwr, gtemp\n# Idx, W, C\n0, 45.2, 61\n",
        );

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].device_index, "0");
        assert_eq!(
            samples[0].fields,
            vec![
                ("pwr".to_string(), FieldValue::Number(45.2)),
                ("gtemp".to_string(), FieldValue::Number(61.0)),
            ]
        );
    }

    #[test]
    fn test_header_capture() {
        let mut parser = DmonParser::new();
        parser.feed("# gpu, pwr, gtemp\n# Idx, W, C\n");

        assert_eq!(
            parser.columns(),
            Some(&["gpu".to_string(), "pwr".to_string(), "gtemp".to_string()][..])
        );
        assert_eq!(
            parser.units(),
            Some(&["Idx".to_string(), "W".to_string(), "C".to_string()][..])
        );
    }

    #[test]
    fn test_sentinel_maps_to_null() {
        let mut parser = DmonParser::new();
        let samples = parser.feed("# gpu, mtemp\n# Idx, C\n0, -\n");

        assert_eq!(samples[0].fields, vec![("mtemp".to_string(), FieldValue::Null)]);
    }

    #[test]
    fn test_non_numeric_text_passes_through() {
        let mut parser = DmonParser::new();
        let samples = parser.feed("# gpu, pstate\n# Idx, -\n0, P8-ish\n");

        assert_eq!(
            samples[0].fields,
            vec![("pstate".to_string(), FieldValue::Text("P8-ish".to_string()))]
        );
    }

    #[test]
    fn test_field_count_mismatch_drops_row() {
        let mut parser = DmonParser::new();
        let samples = parser.feed("# gpu, pwr, gtemp\n# Idx, W, C\n0, 45.2\n0, 45.2, 61, 99\n");

        assert!(samples.is_empty());
    }

    #[test]
    fn test_data_before_header_dropped() {
        let mut parser = DmonParser::new();
        let samples = parser.feed("0, 45.2, 61\n# gpu, pwr, gtemp\n# Idx, W, C\n1, 30.0, 50\n");

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].device_index, "1");
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut parser = DmonParser::new();
        let samples = parser.feed("# gpu, pwr\n# Idx, W\n\n   \n0, 12\n");

        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_reemitted_header_ignored() {
        let mut parser = DmonParser::new();
        parser.feed("# gpu, pwr\n# Idx, W\n");
        let samples = parser.feed("# gpu, pwr\n# Idx, W\n0, 12\n");

        assert_eq!(parser.columns().unwrap().len(), 2);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].fields[0].1, FieldValue::Number(12.0));
    }

    #[test]
    fn test_partial_line_reassembly() {
        let mut parser = DmonParser::new();
        parser.feed("# gpu, pwr, gtemp\n# Idx, W, C\n");

        assert!(parser.feed("0, 45").is_empty());
        let samples = parser.feed(".2, 61\n");

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].fields[0].1, FieldValue::Number(45.2));
    }

    #[test]
    fn test_crlf_terminated_lines() {
        let mut parser = DmonParser::new();
        let samples = parser.feed("# gpu, pwr\r\n# Idx, W\r\n0, 12\r\n");

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].device_index, "0");
    }

    #[test]
    fn test_oversized_partial_line_discarded() {
        let mut parser = DmonParser::new();
        parser.feed("# gpu, pwr\n# Idx, W\n");

        parser.feed(&"x".repeat(MAX_PARTIAL_LINE + 1));
        // Buffer was cleared; the stream recovers on the next full line
        let samples = parser.feed("0, 12\n");

        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_missing_index_column_drops_rows() {
        let mut parser = DmonParser::new();
        let samples = parser.feed("# pwr, gtemp\n# W, C\n45.2, 61\n");

        assert!(samples.is_empty());
    }

    #[test]
    fn test_sample_serialization() {
        let sample = Sample {
            device_index: "0".to_string(),
            fields: vec![
                ("pwr".to_string(), FieldValue::Number(45.2)),
                ("mtemp".to_string(), FieldValue::Null),
                ("pstate".to_string(), FieldValue::Text("P8".to_string())),
            ],
        };

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "pwr": 45.2, "mtemp": null, "pstate": "P8" })
        );
    }
}
