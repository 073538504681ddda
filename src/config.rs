//! Layered project configuration: defaults, then `.conductor/conductor.toml`
//! if present, then explicit CLI overrides applied last.
//!
//! Carries only the settings the fixed five-phase machine actually needs:
//! the writer/reviewer CLI command, budget ceilings, and concurrency
//! limits — dropped pattern libraries, hook scripts, and per-phase skill
//! lists that an arbitrary-length phase list would otherwise need.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub claude_cmd: String,
    pub soft_timeout_secs: u64,
    pub hard_timeout_secs: u64,
    pub cost_per_invocation: f64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            claude_cmd: "claude".to_string(),
            soft_timeout_secs: 120,
            hard_timeout_secs: 600,
            cost_per_invocation: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSettings {
    pub project_ceiling: f64,
    pub task_ceiling: f64,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            project_ceiling: 500.0,
            task_ceiling: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingSettings {
    pub max_parallel_tasks: usize,
    pub iteration_cap: u32,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 4,
            iteration_cap: 50,
        }
    }
}

/// Top-level `.conductor/conductor.toml` document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub agent: AgentSettings,
    pub budget: BudgetSettings,
    pub scheduling: SchedulingSettings,
}

impl ConductorConfig {
    /// Loads `<project_dir>/.conductor/conductor.toml` if present, otherwise
    /// returns defaults. A malformed file is a hard error rather than a
    /// silent fallback.
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let path = Self::config_path(project_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let config: ConductorConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".conductor").join("conductor.toml")
    }

    pub fn store_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".conductor").join("conductor.db")
    }

    pub fn worktrees_root(project_dir: &Path) -> PathBuf {
        project_dir.join(".conductor").join("worktrees")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = ConductorConfig::load(dir.path()).unwrap();
        assert_eq!(config.scheduling.max_parallel_tasks, 4);
    }

    #[test]
    fn load_parses_partial_overrides() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".conductor")).unwrap();
        std::fs::write(
            ConductorConfig::config_path(dir.path()),
            "[budget]\nproject_ceiling = 1000.0\n",
        )
        .unwrap();
        let config = ConductorConfig::load(dir.path()).unwrap();
        assert_eq!(config.budget.project_ceiling, 1000.0);
        assert_eq!(config.budget.task_ceiling, 25.0);
    }
}
