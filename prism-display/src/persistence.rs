//! On-disk journal of the original display settings
//!
//! The journal is the single authoritative record of pending revert work.
//! It is created by the first successful apply of a session, updated by
//! subsequent applies, and deleted once a revert succeeds. On process start
//! a journal found on disk immediately drives a recovery revert.

use crate::error::PersistenceError;
use crate::topology::{is_topology_the_same, TopologyData};
use crate::types::{DeviceId, DeviceModeMap, HdrStateMap};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Everything needed to revert the changes made to the display devices.
///
/// The "original" values belong to the `modified` topology: the OS persists
/// modes, primary and HDR settings keyed by topology, so they can only be
/// restored after re-entering it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentData {
    pub topology: TopologyData,

    /// Primary display to restore. Empty when no primary change is
    /// outstanding.
    #[serde(default)]
    pub original_primary_display: DeviceId,

    /// Display modes to restore. Empty when no mode change is outstanding.
    #[serde(default)]
    pub original_modes: DeviceModeMap,

    /// HDR states to restore. Empty when no HDR change is outstanding.
    #[serde(default)]
    pub original_hdr_states: HdrStateMap,
}

impl PersistentData {
    /// Whether reverting this journal would change anything on the system.
    pub fn contains_modifications(&self) -> bool {
        !is_topology_the_same(&self.topology.initial, &self.topology.modified)
            || !self.original_primary_display.is_empty()
            || !self.original_modes.is_empty()
            || !self.original_hdr_states.is_empty()
    }
}

/// Store that serializes the journal to a JSON file.
///
/// Writes are atomic: the data is written to a sibling temp file which is
/// then renamed over the target, so readers never observe a torn journal.
#[derive(Debug, Clone)]
pub struct JournalStore {
    path: PathBuf,
}

impl JournalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves the journal, replacing any previous content.
    pub async fn save(&self, data: &PersistentData) -> Result<(), PersistenceError> {
        let json = to_pretty_json(data)?;
        let staging = self.staging_path();

        fs::write(&staging, &json).await?;
        fs::rename(&staging, &self.path).await?;

        debug!(path = %self.path.display(), "saved display settings journal");
        Ok(())
    }

    /// Loads the journal if one is present. A missing file yields `None`;
    /// an unreadable or corrupt file is logged and also yields `None` so
    /// that recovery can proceed with whatever state the system is in.
    pub async fn load(&self) -> Option<PersistentData> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read the display settings journal");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to parse the display settings journal");
                None
            }
        }
    }

    /// Removes the journal file. A file that is already gone is not an
    /// error.
    pub async fn delete(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(OsString::from(".tmp"));
        PathBuf::from(name)
    }
}

/// Pretty-prints with 4-space indentation and a trailing newline, matching
/// the journal file contract.
fn to_pretty_json(data: &PersistentData) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DisplayMode, HdrState, RefreshRate, Resolution};

    fn sample_data() -> PersistentData {
        let mut data = PersistentData {
            topology: TopologyData {
                initial: vec![vec!["id1".to_string()]],
                modified: vec![vec!["id1".to_string(), "id2".to_string()]],
            },
            original_primary_display: "id1".to_string(),
            ..Default::default()
        };
        data.original_modes.insert(
            "id1".to_string(),
            DisplayMode {
                resolution: Resolution {
                    width: 3840,
                    height: 2160,
                },
                refresh_rate: RefreshRate {
                    numerator: 60000,
                    denominator: 1001,
                },
            },
        );
        data.original_hdr_states
            .insert("id1".to_string(), HdrState::Enabled);
        data.original_hdr_states
            .insert("id2".to_string(), HdrState::Disabled);
        data
    }

    #[test]
    fn modifications_require_a_topology_delta_or_originals() {
        let mut data = PersistentData::default();
        assert!(!data.contains_modifications());

        data.topology.initial = vec![vec!["a".to_string()]];
        data.topology.modified = vec![vec!["a".to_string()]];
        assert!(!data.contains_modifications());

        data.topology.modified = vec![vec!["a".to_string()], vec!["b".to_string()]];
        assert!(data.contains_modifications());

        data.topology.modified = data.topology.initial.clone();
        data.original_primary_display = "a".to_string();
        assert!(data.contains_modifications());
    }

    #[test]
    fn topology_equivalence_is_order_insensitive() {
        let data = PersistentData {
            topology: TopologyData {
                initial: vec![vec!["a".to_string(), "b".to_string()]],
                modified: vec![vec!["b".to_string(), "a".to_string()]],
            },
            ..Default::default()
        };
        assert!(!data.contains_modifications());
    }

    #[test]
    fn journal_file_format_matches_the_contract() {
        let json = String::from_utf8(to_pretty_json(&sample_data()).unwrap()).unwrap();
        // 4-space indentation, lowercase HDR enum strings.
        assert!(json.contains("    \"topology\""));
        assert!(json.contains("\"original_primary_display\": \"id1\""));
        assert!(json.contains("\"enabled\""));
        assert!(json.contains("\"disabled\""));
        assert!(json.ends_with("}\n"));
    }

    #[tokio::test]
    async fn save_load_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JournalStore::new(dir.path().join("display_settings.json"));

        assert!(store.load().await.is_none());

        let data = sample_data();
        store.save(&data).await.unwrap();
        assert_eq!(store.load().await, Some(data.clone()));

        // Saving again replaces the previous content.
        let mut updated = data;
        updated.original_primary_display.clear();
        store.save(&updated).await.unwrap();
        assert_eq!(store.load().await, Some(updated));

        store.delete().await.unwrap();
        assert!(store.load().await.is_none());

        // Deleting a missing file is fine.
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_journal_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display_settings.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let store = JournalStore::new(&path);
        assert!(store.load().await.is_none());
    }
}
