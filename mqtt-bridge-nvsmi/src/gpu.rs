//! GPU enumeration via `nvidia-smi --query-gpu`.

use tokio::process::Command;

use crate::error::{BridgeError, Result};

/// A GPU reported by the enumeration query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gpu {
    /// dmon-local device index, 0-based.
    pub index: u32,
    /// Marketing name, e.g. "NVIDIA GeForce RTX 3080".
    pub name: String,
    /// Vendor-assigned identifier, stable across reboots.
    pub uuid: String,
}

/// Query the driver once for the installed GPUs.
///
/// Returns an empty list when the tool prints nothing; the caller decides
/// whether that is fatal.
pub async fn enumerate(binary: &str) -> Result<Vec<Gpu>> {
    let output = Command::new(binary)
        .args(["--query-gpu=index,name,uuid", "--format=csv,noheader"])
        .output()
        .await
        .map_err(|e| BridgeError::Enumeration(format!("failed to run {binary}: {e}")))?;

    if !output.status.success() {
        return Err(BridgeError::Enumeration(format!(
            "{} exited with {}: {}",
            binary,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(parse_gpu_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `index, name, uuid` lines from the enumeration query.
///
/// Lines that don't fit the expected shape are skipped: the output format is
/// owned by the tool and may grow fields.
pub fn parse_gpu_list(raw: &str) -> Vec<Gpu> {
    raw.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let mut parts = line.splitn(3, ',').map(str::trim);
            let index = parts.next()?.parse().ok()?;
            let name = parts.next()?.to_string();
            let uuid = parts.next()?.to_string();
            Some(Gpu { index, name, uuid })
        })
        .collect()
}
