//! Persistent storage for the emulator state

use crate::EmulatorState;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// JSON file holding an [`EmulatorState`]
#[derive(Debug, Clone)]
pub struct FileStorage {
    file_path: String,
}

impl FileStorage {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.file_path
    }

    /// Load state from file, or `None` when the file does not exist yet
    pub async fn load(&self) -> Result<Option<EmulatorState>> {
        if !Path::new(&self.file_path).exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&self.file_path)
            .await
            .with_context(|| format!("Failed to read emulator state: {}", self.file_path))?;
        let state: EmulatorState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse emulator state: {}", self.file_path))?;
        debug!(path = %self.file_path, "Loaded emulator state");
        Ok(Some(state))
    }

    /// Write already-serialised state
    pub async fn save_json(&self, content: String) -> Result<()> {
        if let Some(parent) = Path::new(&self.file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(&self.file_path, content)
            .await
            .with_context(|| format!("Failed to write emulator state: {}", self.file_path))?;
        debug!(path = %self.file_path, "Saved emulator state");
        Ok(())
    }
}

/// Human-readable views of the state
pub struct StateExporter;

impl StateExporter {
    pub fn to_summary(state: &EmulatorState) -> String {
        let mut summary = String::new();
        summary.push_str("Warehouse Emulator State\n");
        summary.push_str("========================\n");
        summary.push_str(&format!("Region: {}\n", state.region));
        summary.push_str(&format!("Roles: {}\n", state.roles.len()));
        for role in state.roles.values() {
            summary.push_str(&format!("  - {} ({})\n", role.name, role.arn));
            for policy in &role.attached_policies {
                summary.push_str(&format!("      policy {}\n", policy));
            }
        }
        summary.push_str(&format!("Clusters: {}\n", state.clusters.len()));
        for cluster in state.clusters.values() {
            summary.push_str(&format!(
                "  - {} [{}] {} x{}\n",
                cluster.identifier,
                cluster.status,
                cluster.node_type,
                cluster.number_of_nodes.unwrap_or(1)
            ));
            summary.push_str(&format!("      tables: {}\n", cluster.tables.len()));
            for table in &cluster.tables {
                summary.push_str(&format!("        {}\n", table));
            }
        }
        summary
    }
}
