use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .filter(|v: &usize| *v > 0)
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub engine: EngineConfig,
    pub merge: MergeConfig,
    pub plans: PlansConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIGIL_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VIGIL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            engine: EngineConfig::from_env_profiled(p),
            merge: MergeConfig::from_env_profiled(p),
            plans: PlansConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  engine:  fork_join_parallelism={}, max_plan_depth={}, fetch_parallelism={}",
            self.engine.fork_join_parallelism,
            self.engine.max_plan_depth,
            self.engine.fetch_parallelism
        );
        tracing::info!("  merge:   max_gap={}, max_duration={}", self.merge.max_gap, self.merge.max_duration);
        tracing::info!("  plans:   dir={}", self.plans.plans_dir.display());
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent per-item sub-pipelines inside a ForkJoin (1 = sequential).
    pub fork_join_parallelism: usize,
    /// Maximum ForkJoin nesting depth before evaluation is refused.
    pub max_plan_depth: usize,
    /// Concurrent sub-range requests issued by a DataFetcher.
    pub fetch_parallelism: usize,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            fork_join_parallelism: profiled_env_usize(
                p,
                "VIGIL_FORK_JOIN_PARALLELISM",
                defaults.fork_join_parallelism,
            ),
            max_plan_depth: profiled_env_usize(p, "VIGIL_MAX_PLAN_DEPTH", defaults.max_plan_depth),
            fetch_parallelism: profiled_env_usize(
                p,
                "VIGIL_FETCH_PARALLELISM",
                defaults.fetch_parallelism,
            ),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fork_join_parallelism: 1,
            max_plan_depth: 8,
            fetch_parallelism: 4,
        }
    }
}

// ── Merge ─────────────────────────────────────────────────────

/// Process-wide merge policy defaults, overridable per alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Period string, e.g. `PT2H` or `2h`.
    pub max_gap: String,
    /// Period string, e.g. `P7D` or `7d`.
    pub max_duration: String,
}

impl MergeConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            max_gap: profiled_env_or(p, "VIGIL_MERGE_MAX_GAP", &defaults.max_gap),
            max_duration: profiled_env_or(p, "VIGIL_MERGE_MAX_DURATION", &defaults.max_duration),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_gap: "PT2H".to_string(),
            max_duration: "P7D".to_string(),
        }
    }
}

// ── Plans ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansConfig {
    pub plans_dir: PathBuf,
}

impl PlansConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            plans_dir: PathBuf::from(profiled_env_or(p, "VIGIL_PLANS_DIR", "data/plans")),
        }
    }
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            plans_dir: PathBuf::from("data/plans"),
        }
    }
}
