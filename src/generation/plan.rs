use crate::error::{ConfigError, GenerationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Partial,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ItemStatus {
    /// Completed and skipped items are never picked up again.
    pub fn is_done(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Skipped)
    }
}

/// One artifact to produce. The descriptive fields are only read by the prompt builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Stats {
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut stats = Stats {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
                ItemStatus::Skipped => stats.skipped += 1,
                ItemStatus::Pending | ItemStatus::InProgress => {}
            }
        }
        stats
    }

    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.processed())
    }

    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed() as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Site-wide values handed to prompt construction.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    pub items: Vec<WorkItem>,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default)]
    pub stats: Stats,
}

impl Plan {
    pub fn new(id: impl Into<String>, items: Vec<WorkItem>) -> Self {
        let now = Utc::now();
        let mut plan = Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            context: BTreeMap::new(),
            items,
            status: PlanStatus::Pending,
            stats: Stats::default(),
        };
        plan.refresh();
        plan
    }

    /// Items that still need work: everything not completed or skipped.
    pub fn pending_count(&self) -> usize {
        self.items.iter().filter(|item| !item.status.is_done()).count()
    }

    /// Recompute stats from item state and derive the plan status.
    pub fn refresh(&mut self) {
        self.stats = Stats::from_items(&self.items);
        self.status = self.derive_status();
    }

    fn derive_status(&self) -> PlanStatus {
        let stats = &self.stats;
        let succeeded = stats.completed + stats.skipped;
        if stats.total > 0 && succeeded == stats.total {
            return PlanStatus::Completed;
        }
        if stats.failed > 0 {
            return if succeeded > 0 {
                PlanStatus::Partial
            } else {
                PlanStatus::Failed
            };
        }
        if succeeded > 0 {
            return PlanStatus::Partial;
        }
        PlanStatus::Pending
    }

    /// Return items orphaned in `in_progress` by an interrupted process to `pending`.
    pub fn reset_interrupted(&mut self) -> usize {
        let mut reset = 0;
        for item in &mut self.items {
            if item.status == ItemStatus::InProgress {
                item.status = ItemStatus::Pending;
                reset += 1;
            }
        }
        reset
    }

    pub fn mark_in_progress(&mut self, index: usize) {
        if let Some(item) = self.items.get_mut(index) {
            item.status = ItemStatus::InProgress;
        }
        self.updated_at = Utc::now();
    }

    /// Fold a finished output back into the item and the stats.
    pub fn apply_output(&mut self, index: usize, output: &GenerationOutput) {
        let Some(item) = self.items.get_mut(index) else {
            return;
        };
        item.attempts += output.attempts;
        if output.skipped {
            item.status = ItemStatus::Skipped;
            item.last_error = None;
        } else if output.success {
            item.status = ItemStatus::Completed;
            item.last_error = None;
            item.completed_at = Some(Utc::now());
        } else if output.is_cancelled() {
            // Not a failure: keep whatever the last real attempt recorded.
            item.status = ItemStatus::Pending;
        } else {
            item.status = ItemStatus::Failed;
            item.last_error = output.error_message.clone();
        }
        self.updated_at = Utc::now();
        self.stats = Stats::from_items(&self.items);
        // The driver derives the final status once the run is over.
        if self.status != PlanStatus::InProgress {
            self.status = self.derive_status();
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::PlanIo {
            path: path.to_path_buf(),
            source,
        })?;
        let mut plan: Plan =
            serde_json::from_str(&raw).map_err(|source| ConfigError::PlanFormat {
                path: path.to_path_buf(),
                source,
            })?;
        plan.stats = Stats::from_items(&plan.items);
        Ok(plan)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let encoded =
            serde_json::to_string_pretty(self).map_err(|source| ConfigError::PlanFormat {
                path: path.to_path_buf(),
                source,
            })?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| ConfigError::PlanIo {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(&tmp, encoded).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }
}

/// Per-item result of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    pub id: String,
    pub path: String,
    pub content: Option<String>,
    pub success: bool,
    pub error: Option<GenerationError>,
    pub error_message: Option<String>,
    pub duration: Duration,
    pub attempts: u32,
    pub skipped: bool,
}

impl GenerationOutput {
    pub fn skipped(item: &WorkItem) -> Self {
        Self {
            id: item.id.clone(),
            path: item.path.clone(),
            success: true,
            skipped: true,
            ..Default::default()
        }
    }

    pub fn succeeded(item: &WorkItem, content: String, attempts: u32, duration: Duration) -> Self {
        Self {
            id: item.id.clone(),
            path: item.path.clone(),
            content: Some(content),
            success: true,
            duration,
            attempts,
            ..Default::default()
        }
    }

    pub fn failed(
        item: &WorkItem,
        error: GenerationError,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            id: item.id.clone(),
            path: item.path.clone(),
            error_message: Some(error.to_string()),
            error: Some(error),
            duration,
            attempts,
            ..Default::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(GenerationError::is_cancelled)
    }

    /// True when this output wrote (or, in a dry run, would have written) an artifact.
    pub fn produced_artifact(&self) -> bool {
        self.success && !self.skipped
    }
}
