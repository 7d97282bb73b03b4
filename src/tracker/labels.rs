//! Label resolution
//!
//! Maps requested label names to tracker label ids, creating labels that do
//! not exist yet. All matching is case-insensitive: `"Bug"` and `"bug"`
//! resolve to the same label, and duplicates in the request collapse to one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::tracker::{adapters, TrackerService};

pub struct LabelResolver {
    service: Arc<TrackerService>,
}

impl LabelResolver {
    pub fn new(service: Arc<TrackerService>) -> Self {
        Self { service }
    }

    /// Resolve label names to ids, creating missing labels.
    ///
    /// Failures surface as [`Error::LabelResolution`]; the filer treats
    /// them as non-fatal and files the issue unlabeled.
    pub async fn resolve(&self, names: &[String]) -> Result<Vec<String>> {
        let requested = dedupe_case_insensitive(names);
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let team = self.service.team().await?;
        let tracker = self.service.tracker();

        let existing = tracker
            .issue_labels(&team.id)
            .await
            .map_err(|e| Error::LabelResolution(format!("label listing failed: {}", e)))?;
        let mut by_name: HashMap<String, String> = HashMap::new();
        for raw in existing {
            if let Ok(label) = adapters::label_from_raw(raw) {
                by_name.insert(label.name.to_lowercase(), label.id);
            }
        }

        let mut ids = Vec::with_capacity(requested.len());
        for name in requested {
            let key = name.to_lowercase();
            if let Some(id) = by_name.get(&key) {
                ids.push(id.clone());
                continue;
            }

            let created = tracker
                .create_issue_label(&team.id, &name)
                .await
                .map_err(|e| {
                    Error::LabelResolution(format!("creating label {:?} failed: {}", name, e))
                })?;
            let label = adapters::label_from_raw(created)
                .map_err(|e| Error::LabelResolution(e.to_string()))?;
            tracing::info!(label = %label.name, id = %label.id, "created tracker label");
            by_name.insert(key, label.id.clone());
            ids.push(label.id);
        }

        Ok(ids)
    }
}

/// Drop case-insensitive duplicates, keeping the first spelling.
fn dedupe_case_insensitive(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .filter(|n| !n.trim().is_empty())
        .filter(|n| seen.insert(n.to_lowercase()))
        .cloned()
        .collect()
}
