//! Filesystem-backed plan loader.
//!
//! Walks a plans directory for `*.yml`, `*.yaml` and `*.json` documents,
//! parses each into a [`PlanDocument`] and keeps the valid ones keyed by
//! `metadata.name`. A bad file is reported in its [`LoadResult`] and never
//! aborts the scan.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::plan::PlanDocument;

// ── Load results ─────────────────────────────────────────────

/// Outcome of loading one file.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub status: LoadStatus,
}

#[derive(Debug)]
pub enum LoadStatus {
    /// Plan parsed and validated.
    Loaded { plan: String },
    /// Dotfile or unsupported extension.
    Skipped { reason: String },
    /// Parse or validation error.
    Failed { error: String },
}

// ── Plan loader ──────────────────────────────────────────────

pub struct PlanLoader {
    plans_dir: PathBuf,
    plans: BTreeMap<String, PlanDocument>,
}

impl PlanLoader {
    pub fn new(plans_dir: impl Into<PathBuf>) -> Self {
        Self {
            plans_dir: plans_dir.into(),
            plans: BTreeMap::new(),
        }
    }

    pub fn plans_dir(&self) -> &Path {
        &self.plans_dir
    }

    /// Scan the plans directory recursively, replacing any previously loaded plans.
    pub fn load_all(&mut self) -> Result<Vec<LoadResult>> {
        if !self.plans_dir.is_dir() {
            return Err(PipelineError::InvalidPlan(format!(
                "plans directory {} does not exist",
                self.plans_dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(&self.plans_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        self.plans.clear();
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let status = self.load_path(&path);
            results.push(LoadResult { path, status });
        }

        info!(
            dir = %self.plans_dir.display(),
            loaded = self.plans.len(),
            files = results.len(),
            "plans loaded"
        );
        Ok(results)
    }

    fn load_path(&mut self, path: &Path) -> LoadStatus {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            return LoadStatus::Skipped { reason: "dotfile".to_string() };
        }
        if !is_plan_file(path) {
            return LoadStatus::Skipped {
                reason: "not a YAML or JSON file".to_string(),
            };
        }

        match load_file(path) {
            Ok(doc) => {
                let name = doc.metadata.name.clone();
                if self.plans.contains_key(&name) {
                    warn!(path = %path.display(), plan = %name, "duplicate plan name, keeping the first");
                    return LoadStatus::Failed {
                        error: format!("duplicate plan name '{name}'"),
                    };
                }
                self.plans.insert(name.clone(), doc);
                LoadStatus::Loaded { plan: name }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load plan file");
                LoadStatus::Failed { error: e.to_string() }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&PlanDocument> {
        self.plans.get(name)
    }

    /// Loaded plans, sorted by name.
    pub fn plans(&self) -> impl Iterator<Item = &PlanDocument> {
        self.plans.values()
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

fn is_plan_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml" | "yaml" | "json")
    )
}

/// Parse a single plan document from disk.
pub fn load_file(path: &Path) -> Result<PlanDocument> {
    let contents = fs::read_to_string(path)
        .map_err(|e| PipelineError::InvalidPlan(format!("{}: {e}", path.display())))?;
    PlanDocument::from_yaml(&contents)
}
