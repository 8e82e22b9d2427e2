//! Repository configuration, stored as `.strata/config.toml`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use strata_dag::DEFAULT_CHECKPOINT_INTERVAL;
use strata_fabric::SyncMode;
use strata_workflow::AutoAssignRule;

use crate::error::{EngineError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub sync: SyncMode,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync: SyncMode::EveryWrite,
        }
    }
}

/// Per-repository settings. Every key is optional in the file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub name: String,
    pub default_branch: String,
    /// Approvals needed before a pull request is `approved`. At least 1.
    pub required_approvals: u32,
    /// Whether an unapproved pull request may be merged with `force`.
    pub allow_force_merge: bool,
    /// Automatic re-plans when a target branch moves during a merge.
    pub max_merge_retries: u32,
    /// Full snapshot every N commits along a first-parent chain.
    pub checkpoint_interval: u32,
    /// Branch names that can never be deleted, besides the default branch.
    pub protected_branches: Vec<String>,
    pub journal: JournalConfig,
    pub auto_assign: Vec<AutoAssignRule>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "strata".into(),
            default_branch: "main".into(),
            required_approvals: 1,
            allow_force_merge: true,
            max_merge_retries: 3,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            protected_branches: Vec::new(),
            journal: JournalConfig::default(),
            auto_assign: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Read the file at `path`. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_branch.trim().is_empty() {
            return Err(EngineError::Config("default_branch must not be empty".into()));
        }
        if self.required_approvals == 0 {
            return Err(EngineError::Config("required_approvals must be at least 1".into()));
        }
        Ok(())
    }

    pub fn is_protected(&self, branch: &str) -> bool {
        self.protected_branches.iter().any(|name| name == branch)
    }

    /// Total merge attempts, counting the first.
    pub fn merge_attempts(&self) -> u32 {
        self.max_merge_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::ActorId;
    use strata_workflow::IssueKind;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = RepositoryConfig::from_toml("").unwrap();
        assert_eq!(config, RepositoryConfig::default());
        assert_eq!(config.required_approvals, 1);
        assert_eq!(config.journal.sync, SyncMode::EveryWrite);
    }

    #[test]
    fn parses_every_key() {
        let config = RepositoryConfig::from_toml(
            r#"
            name = "hq"
            default_branch = "trunk"
            required_approvals = 2
            allow_force_merge = false
            max_merge_retries = 5
            checkpoint_interval = 8
            protected_branches = ["release/2026"]

            [journal]
            sync = "os-default"

            [[auto_assign]]
            issue_type = "safety"
            assignee = "safety-team"

            [[auto_assign]]
            equipment_category = "HVAC"
            assignee = "hvac-crew"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "hq");
        assert_eq!(config.default_branch, "trunk");
        assert_eq!(config.required_approvals, 2);
        assert!(!config.allow_force_merge);
        assert_eq!(config.merge_attempts(), 6);
        assert_eq!(config.checkpoint_interval, 8);
        assert!(config.is_protected("release/2026"));
        assert_eq!(config.journal.sync, SyncMode::OsDefault);
        assert_eq!(config.auto_assign.len(), 2);
        assert_eq!(config.auto_assign[0].issue_type, Some(IssueKind::Safety));
        assert_eq!(config.auto_assign[1].assignee, ActorId::from("hvac-crew"));
    }

    #[test]
    fn zero_approvals_is_rejected() {
        let err = RepositoryConfig::from_toml("required_approvals = 0").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".strata").join("config.toml");
        assert!(RepositoryConfig::load(&path).unwrap().is_none());

        let mut config = RepositoryConfig::named("annex");
        config.protected_branches.push("release".into());
        config.save(&path).unwrap();
        assert_eq!(RepositoryConfig::load(&path).unwrap(), Some(config));
    }
}
