//! User-scoped JSON configuration (spec.md §6).
//!
//! Lives at a configurable path (default `~/.agentdock/config.json`),
//! expanding `~`. Missing file loads all defaults, matching the teacher's
//! `ManifoldConfig::load` behavior of "no file means defaults, not an
//! error". Unlike the teacher's TOML config, `budget` mutators go through a
//! dedicated validator rather than relying on `deny_unknown_fields` alone,
//! since `monthlyLimit`/`perSessionDefault` have cross-field constraints
//! serde can't express.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level `agentdock` configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentdockConfig {
    pub budget: BudgetConfig,

    /// Alternate sandbox template name (spec.md §6 env var equivalent, also
    /// settable here).
    pub default_template: Option<String>,

    /// Free-form keys the config format allows but this crate doesn't
    /// interpret, preserved on round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Spend-limit settings (spec.md §6: `{monthlyLimit, perSessionDefault,
/// warningThresholds[]}`).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default, rename_all = "camelCase")]
pub struct BudgetConfig {
    pub monthly_limit: Option<f64>,
    pub per_session_default: Option<f64>,
    pub warning_thresholds: Vec<u8>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_limit: None,
            per_session_default: None,
            warning_thresholds: vec![80, 100],
        }
    }
}

/// Error loading or validating an `agentdock` configuration file.
#[derive(Debug)]
pub struct ConfigError {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(p) => write!(f, "{}: {}", p.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AgentdockConfig {
    /// Load from `path`. A missing file yields all defaults, not an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {err}"),
                });
            }
        };
        let config = Self::parse(&contents).map_err(|mut err| {
            err.path = Some(path.to_owned());
            err
        })?;
        config.validate_budget().map_err(|message| ConfigError {
            path: Some(path.to_owned()),
            message,
        })?;
        Ok(config)
    }

    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError {
            path: None,
            message: err.to_string(),
        })
    }

    /// Validate the budget subtree's cross-field constraints (spec.md §6:
    /// "Mutators go through a typed validator for the budget subtree").
    pub fn validate_budget(&self) -> Result<(), String> {
        let budget = &self.budget;
        if let Some(limit) = budget.monthly_limit {
            if limit < 0.0 {
                return Err(format!("budget.monthlyLimit must be non-negative, got {limit}"));
            }
        }
        if let Some(default) = budget.per_session_default {
            if default < 0.0 {
                return Err(format!("budget.perSessionDefault must be non-negative, got {default}"));
            }
        }
        if let (Some(limit), Some(default)) = (budget.monthly_limit, budget.per_session_default) {
            if default > limit {
                return Err(format!(
                    "budget.perSessionDefault ({default}) exceeds budget.monthlyLimit ({limit})"
                ));
            }
        }
        for threshold in &budget.warning_thresholds {
            if *threshold == 0 {
                return Err("budget.warningThresholds entries must be > 0".to_owned());
            }
        }
        Ok(())
    }
}

/// Expand a leading `~` to the current user's home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Default config path: `~/.agentdock/config.json`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    expand_home("~/.agentdock/config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_no_limits_but_default_thresholds() {
        let cfg = AgentdockConfig::default();
        assert_eq!(cfg.budget.monthly_limit, None);
        assert_eq!(cfg.budget.warning_thresholds, vec![80, 100]);
    }

    #[test]
    fn parse_empty_object_uses_defaults() {
        let cfg = AgentdockConfig::parse("{}").unwrap();
        assert_eq!(cfg, AgentdockConfig::default());
    }

    #[test]
    fn unknown_top_level_fields_round_trip_via_extra() {
        let cfg = AgentdockConfig::parse(r#"{"bogus": true}"#).unwrap();
        assert_eq!(cfg.extra.get("bogus"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn budget_rejects_unknown_field() {
        let err = AgentdockConfig::parse(r#"{"budget": {"bogus": 1}}"#).unwrap_err();
        assert!(err.message.to_lowercase().contains("unknown field"));
    }

    #[test]
    fn parse_full_budget() {
        let json = r#"{"budget": {"monthlyLimit": 500.0, "perSessionDefault": 10.0, "warningThresholds": [50, 80]}}"#;
        let cfg = AgentdockConfig::parse(json).unwrap();
        assert_eq!(cfg.budget.monthly_limit, Some(500.0));
        assert_eq!(cfg.budget.per_session_default, Some(10.0));
        assert_eq!(cfg.budget.warning_thresholds, vec![50, 80]);
        assert!(cfg.validate_budget().is_ok());
    }

    #[test]
    fn validate_rejects_negative_monthly_limit() {
        let cfg = AgentdockConfig::parse(r#"{"budget": {"monthlyLimit": -1.0}}"#).unwrap();
        assert!(cfg.validate_budget().is_err());
    }

    #[test]
    fn validate_rejects_per_session_exceeding_monthly() {
        let json = r#"{"budget": {"monthlyLimit": 10.0, "perSessionDefault": 20.0}}"#;
        let cfg = AgentdockConfig::parse(json).unwrap();
        assert!(cfg.validate_budget().is_err());
    }

    #[test]
    fn validate_rejects_zero_warning_threshold() {
        let cfg = AgentdockConfig::parse(r#"{"budget": {"warningThresholds": [0]}}"#).unwrap();
        assert!(cfg.validate_budget().is_err());
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = AgentdockConfig::load(Path::new("/nonexistent/agentdock/config.json")).unwrap();
        assert_eq!(cfg, AgentdockConfig::default());
    }

    #[test]
    fn load_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"budget": {"monthlyLimit": 100.0}}"#).unwrap();
        let cfg = AgentdockConfig::load(&path).unwrap();
        assert_eq!(cfg.budget.monthly_limit, Some(100.0));
    }

    #[test]
    fn load_invalid_budget_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"budget": {"monthlyLimit": -5.0}}"#).unwrap();
        let err = AgentdockConfig::load(&path).unwrap_err();
        assert!(err.path.is_some());
    }

    #[test]
    fn expand_home_leaves_absolute_paths_alone() {
        assert_eq!(expand_home("/etc/agentdock.json"), PathBuf::from("/etc/agentdock.json"));
    }
}
