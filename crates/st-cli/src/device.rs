//! Device identity management.
//!
//! Each device gets a persistent `device-<uuid>` identifier stored in
//! `device.json` in the data directory. Every upload carries it so the
//! collector can tell devices apart. The same file remembers when the
//! last no-sleep message went out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Device identity stored in `device.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Persistent identifier, `device-` followed by a hyphenless UUID.
    pub device_id: String,
    /// Human-friendly label (e.g., "laptop").
    pub label: String,
    /// Date the last no-sleep message was attached to an upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_no_sleep_message_date: Option<NaiveDate>,
}

/// Returns the path to device.json inside `data_dir`.
pub fn device_json_path(data_dir: &Path) -> PathBuf {
    data_dir.join("device.json")
}

/// Loads device identity from a specific path.
///
/// Returns `None` if the file doesn't exist.
/// Returns an error if the file exists but is unreadable/unparseable.
pub fn load_from(path: &Path) -> Result<Option<DeviceIdentity>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let identity: DeviceIdentity =
                serde_json::from_str(&content).context("failed to parse device.json")?;
            Ok(Some(identity))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("failed to read device.json"),
    }
}

/// Initializes device identity at a specific path.
///
/// If device.json already exists, returns the existing identity
/// (updating the label if a new one is provided).
/// If it doesn't exist, generates a new identifier and writes device.json.
pub fn init_device_at(path: &Path, label: Option<&str>) -> Result<DeviceIdentity> {
    if let Some(mut existing) = load_from(path)? {
        if let Some(new_label) = label {
            if existing.label != new_label {
                existing.label = new_label.to_string();
                save_to(path, &existing)?;
            }
        }
        return Ok(existing);
    }

    let default_label = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let identity = DeviceIdentity {
        device_id: format!("device-{}", Uuid::new_v4().simple()),
        label: label.unwrap_or(&default_label).to_string(),
        last_no_sleep_message_date: None,
    };
    save_to(path, &identity)?;
    tracing::info!(device_id = %identity.device_id, "created device identity");
    Ok(identity)
}

/// Writes device identity to a specific path.
pub fn save_to(path: &Path, identity: &DeviceIdentity) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let json = serde_json::to_vec_pretty(identity).context("failed to serialize identity")?;
    st_store::write_atomic(path, &json).context("failed to write device.json")?;
    Ok(())
}
