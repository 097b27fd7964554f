//! Optimizer configuration structures.
//!
//! These structures define which rewrite rules run and the knobs each rule
//! reads when it is invoked.

use serde::{Deserialize, Serialize};

/// Describes one named, user-settable option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingDescriptor {
    /// Setting name as exposed to users.
    pub name: &'static str,
    /// Human readable description.
    pub description: &'static str,
    /// Default value.
    pub default: i64,
    /// Other names accepted for the setting.
    pub aliases: &'static [&'static str],
}

impl SettingDescriptor {
    /// Returns true if `name` is this setting's name or one of its aliases,
    /// ignoring ASCII case.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(self.name)
            || self.aliases.iter().any(|alias| name.eq_ignore_ascii_case(alias))
    }
}

/// Main optimizer configuration.
///
/// # Example
///
/// ```rust
/// use sparse_common::config::OptimizerConfig;
///
/// let config = OptimizerConfig::default();
/// assert_eq!(config.sparse_build.column_threshold, 10);
/// assert!(config.enable_sparse_build);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Whether to fold constant expressions.
    /// Default: true
    pub enable_constant_folding: bool,

    /// Whether to run the sparse-build join rewrite.
    /// Default: true
    pub enable_sparse_build: bool,

    /// Whether to collect per-rule statistics.
    /// Default: false
    pub collect_stats: bool,

    /// Sparse-build rule configuration.
    pub sparse_build: SparseBuildConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enable_constant_folding: true,
            enable_sparse_build: true,
            collect_stats: false,
            sparse_build: SparseBuildConfig::default(),
        }
    }
}

impl OptimizerConfig {
    /// Creates a minimal config with all rules disabled.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            enable_constant_folding: false,
            enable_sparse_build: false,
            collect_stats: false,
            sparse_build: SparseBuildConfig::default(),
        }
    }

    /// Creates a config with every rule enabled.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Sets the sparse-build column threshold.
    #[must_use]
    pub const fn with_sparse_build_threshold(mut self, threshold: i64) -> Self {
        self.sparse_build.column_threshold = threshold;
        self
    }

    /// Enables or disables the sparse-build rule.
    #[must_use]
    pub const fn with_sparse_build(mut self, enabled: bool) -> Self {
        self.enable_sparse_build = enabled;
        self
    }

    /// Enables or disables constant folding.
    #[must_use]
    pub const fn with_constant_folding(mut self, enabled: bool) -> Self {
        self.enable_constant_folding = enabled;
        self
    }

    /// Enables or disables statistics collection.
    #[must_use]
    pub const fn with_stats(mut self, enabled: bool) -> Self {
        self.collect_stats = enabled;
        self
    }

    /// Returns every named setting this configuration exposes.
    #[must_use]
    pub fn settings() -> Vec<SettingDescriptor> {
        vec![SparseBuildConfig::THRESHOLD_SETTING]
    }

    /// Sets a named integer option.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a known setting.
    pub fn set_option(&mut self, name: &str, value: i64) -> Result<(), String> {
        if SparseBuildConfig::THRESHOLD_SETTING.matches(name) {
            self.sparse_build.column_threshold = value;
            Ok(())
        } else {
            Err(format!("unrecognized optimizer setting: {name}"))
        }
    }

    /// Reads a named integer option.
    #[must_use]
    pub fn get_option(&self, name: &str) -> Option<i64> {
        SparseBuildConfig::THRESHOLD_SETTING
            .matches(name)
            .then_some(self.sparse_build.column_threshold)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value found.
    pub fn validate(&self) -> Result<(), String> {
        self.sparse_build.validate()
    }
}

/// Sparse-build rule configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseBuildConfig {
    /// Minimum number of build-side columns for a join to be rewritten.
    /// A negative value disables the rule.
    /// Default: 10
    pub column_threshold: i64,
}

impl SparseBuildConfig {
    /// Default column threshold.
    pub const DEFAULT_COLUMN_THRESHOLD: i64 = 10;

    /// The user-facing threshold option.
    pub const THRESHOLD_SETTING: SettingDescriptor = SettingDescriptor {
        name: "sparse_build_optimizer_column_threshold",
        description: "Minimum number of build-side columns before a left join packs its build \
                      side into a sparse variant. Set to a negative value to disable.",
        default: Self::DEFAULT_COLUMN_THRESHOLD,
        aliases: &["fivetran_sparse_build_optimizer_column_threshold"],
    };

    /// Creates a config with the given threshold.
    #[inline]
    #[must_use]
    pub const fn new(column_threshold: i64) -> Self {
        Self { column_threshold }
    }

    /// Creates a config that disables the rule.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(-1)
    }

    /// Returns true if the rule may rewrite anything.
    #[inline]
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.column_threshold >= 0
    }

    /// Returns the threshold as a column count, or `None` when disabled.
    #[must_use]
    pub fn min_columns(&self) -> Option<usize> {
        usize::try_from(self.column_threshold).ok()
    }

    /// Validates the configuration.
    ///
    /// Every threshold is accepted: zero makes every left join eligible and
    /// a negative value disables the rule.
    ///
    /// # Errors
    ///
    /// Currently never fails.
    pub fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Default for SparseBuildConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COLUMN_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();
        assert!(config.enable_constant_folding);
        assert!(config.enable_sparse_build);
        assert_eq!(config.sparse_build.column_threshold, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_config() {
        let config = OptimizerConfig::minimal();
        assert!(!config.enable_constant_folding);
        assert!(!config.enable_sparse_build);
    }

    #[test]
    fn test_threshold_builder() {
        let config = OptimizerConfig::default().with_sparse_build_threshold(3);
        assert_eq!(config.sparse_build.min_columns(), Some(3));
    }

    #[test]
    fn test_negative_threshold_disables() {
        let config = SparseBuildConfig::new(-5);
        assert!(!config.is_enabled());
        assert_eq!(config.min_columns(), None);
        assert!(!SparseBuildConfig::disabled().is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_accepted() {
        let config = SparseBuildConfig::new(0);
        assert!(config.validate().is_ok());
        assert!(config.is_enabled());
        assert_eq!(config.min_columns(), Some(0));
    }

    #[test]
    fn test_named_option() {
        let mut config = OptimizerConfig::default();
        config
            .set_option("sparse_build_optimizer_column_threshold", 25)
            .unwrap();
        assert_eq!(config.sparse_build.column_threshold, 25);
        assert_eq!(
            config.get_option("SPARSE_BUILD_OPTIMIZER_COLUMN_THRESHOLD"),
            Some(25)
        );
        config
            .set_option("fivetran_sparse_build_optimizer_column_threshold", 0)
            .unwrap();
        assert_eq!(config.sparse_build.column_threshold, 0);
        assert_eq!(
            config.get_option("fivetran_sparse_build_optimizer_column_threshold"),
            Some(0)
        );
        assert!(config.set_option("no_such_setting", 1).is_err());
        assert_eq!(config.get_option("no_such_setting"), None);
    }

    #[test]
    fn test_settings_listing() {
        let settings = OptimizerConfig::settings();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].default, 10);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: SparseBuildConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.column_threshold, 10);

        let config: OptimizerConfig =
            serde_json::from_str(r#"{"sparse_build":{"column_threshold":-1}}"#).unwrap();
        assert!(config.enable_sparse_build);
        assert!(!config.sparse_build.is_enabled());
    }
}
