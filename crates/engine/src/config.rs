//! Per-kind versioning configuration.
//!
//! Configuration is plain data loaded from TOML and turned into a
//! [`KindRegistry`] once at setup. The registry is handed to the engine at
//! construction; nothing is looked up from global state at commit time.
//!
//! ```toml
//! [defaults]
//! keep = 0
//! timestamp_fields = ["updated_at", "deleted_at"]
//! snapshot_type = "version"
//!
//! [kinds.article]
//! keep = 5
//! versionable_fields = ["title", "body"]
//! excluded_fields = ["view_count"]
//! snapshot_type = "article_version"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use vellum_storage::DEFAULT_SCHEMA;

use crate::error::ConfigError;

/// Timestamp attributes that never make an update version-worthy.
pub const DEFAULT_TIMESTAMP_FIELDS: [&str; 2] = ["updated_at", "deleted_at"];

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersioningConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub kinds: BTreeMap<String, KindConfig>,
}

/// Values every kind inherits unless it overrides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Defaults {
    /// Retention count. 0 keeps every snapshot.
    pub keep: usize,
    pub timestamp_fields: Vec<String>,
    pub snapshot_type: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            keep: 0,
            timestamp_fields: DEFAULT_TIMESTAMP_FIELDS.iter().map(|s| s.to_string()).collect(),
            snapshot_type: DEFAULT_SCHEMA.to_string(),
        }
    }
}

/// Settings for one record kind as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindConfig {
    pub keep: Option<usize>,
    /// Fields compared by the deduplicator and tracked by the policy.
    #[serde(default)]
    pub versionable_fields: Vec<String>,
    /// Fields whose changes alone never produce a snapshot.
    #[serde(default)]
    pub excluded_fields: Vec<String>,
    pub timestamp_fields: Option<Vec<String>>,
    pub snapshot_type: Option<String>,
}

impl VersioningConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every kind for blank names and contradictory field lists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.snapshot_type.trim().is_empty() {
            return Err(ConfigError::BlankSnapshotType {
                kind: "defaults".to_string(),
            });
        }
        for (kind, cfg) in &self.kinds {
            if kind.trim().is_empty() {
                return Err(ConfigError::BlankKind);
            }
            let lists = [
                ("versionable_fields", Some(&cfg.versionable_fields)),
                ("excluded_fields", Some(&cfg.excluded_fields)),
                ("timestamp_fields", cfg.timestamp_fields.as_ref()),
            ];
            for (list, fields) in lists {
                if fields.is_some_and(|f| f.iter().any(|name| name.trim().is_empty())) {
                    return Err(ConfigError::BlankField {
                        kind: kind.clone(),
                        list,
                    });
                }
            }
            if let Some(field) = cfg
                .versionable_fields
                .iter()
                .find(|f| cfg.excluded_fields.contains(*f))
            {
                return Err(ConfigError::VersionableExcluded {
                    kind: kind.clone(),
                    field: field.clone(),
                });
            }
            if cfg
                .snapshot_type
                .as_deref()
                .is_some_and(|s| s.trim().is_empty())
            {
                return Err(ConfigError::BlankSnapshotType { kind: kind.clone() });
            }
        }
        Ok(())
    }

    /// Validate and resolve into a registry.
    pub fn into_registry(self) -> Result<KindRegistry, ConfigError> {
        self.validate()?;
        let mut registry = KindRegistry::new();
        for (kind, cfg) in &self.kinds {
            if cfg.snapshot_type.is_none() {
                tracing::warn!(
                    kind = %kind,
                    snapshot_type = %self.defaults.snapshot_type,
                    "no snapshot_type configured; using default"
                );
            }
            registry.insert(KindSettings::resolve(kind, cfg, &self.defaults));
        }
        Ok(registry)
    }
}

/// Resolved settings the engine uses for one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct KindSettings {
    pub kind: String,
    pub keep: usize,
    /// Deduplication fields in configured order.
    pub versionable: Vec<String>,
    /// Same fields as a set, for the policy.
    pub tracked: BTreeSet<String>,
    /// Deny-list plus timestamp fields.
    pub excluded: BTreeSet<String>,
    pub schema: String,
}

impl KindSettings {
    /// Settings with library defaults: unlimited retention, nothing
    /// versionable, timestamps excluded.
    pub fn new(kind: impl Into<String>) -> Self {
        let kind: String = kind.into();
        Self::resolve(&kind, &KindConfig::default(), &Defaults::default())
    }

    fn resolve(kind: &str, cfg: &KindConfig, defaults: &Defaults) -> Self {
        let mut versionable = Vec::new();
        for field in &cfg.versionable_fields {
            if !versionable.contains(field) {
                versionable.push(field.clone());
            }
        }
        let timestamps = cfg
            .timestamp_fields
            .as_ref()
            .unwrap_or(&defaults.timestamp_fields);
        Self {
            kind: kind.to_string(),
            keep: cfg.keep.unwrap_or(defaults.keep),
            tracked: versionable.iter().cloned().collect(),
            versionable,
            excluded: cfg
                .excluded_fields
                .iter()
                .chain(timestamps)
                .cloned()
                .collect(),
            schema: cfg
                .snapshot_type
                .clone()
                .unwrap_or_else(|| defaults.snapshot_type.clone()),
        }
    }

    pub fn keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn versionable<I, T>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.versionable.clear();
        for field in fields.into_iter().map(Into::<String>::into) {
            if !self.versionable.contains(&field) {
                self.versionable.push(field);
            }
        }
        self.tracked = self.versionable.iter().cloned().collect();
        self
    }

    pub fn exclude<I, T>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.excluded.extend(fields.into_iter().map(Into::<String>::into));
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}

/// Lookup of [`KindSettings`] by record kind.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: BTreeMap<String, KindSettings>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) settings for `settings.kind`.
    pub fn insert(&mut self, settings: KindSettings) {
        self.kinds.insert(settings.kind.clone(), settings);
    }

    pub fn with(mut self, settings: KindSettings) -> Self {
        self.insert(settings);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&KindSettings> {
        self.kinds.get(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KindSettings> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
keep = 10

[kinds.article]
keep = 3
versionable_fields = ["title", "body", "title"]
excluded_fields = ["view_count"]
snapshot_type = "article_version"

[kinds.comment]
versionable_fields = ["text"]
timestamp_fields = ["edited_at"]
"#;

    #[test]
    fn resolves_kind_overrides_and_defaults() {
        let registry = VersioningConfig::from_toml_str(SAMPLE)
            .unwrap()
            .into_registry()
            .unwrap();
        assert_eq!(registry.len(), 2);

        let article = registry.get("article").unwrap();
        assert_eq!(article.keep, 3);
        assert_eq!(article.versionable, vec!["title", "body"]);
        assert_eq!(article.schema, "article_version");
        assert!(article.excluded.contains("view_count"));
        assert!(article.excluded.contains("updated_at"));
        assert!(article.excluded.contains("deleted_at"));

        let comment = registry.get("comment").unwrap();
        assert_eq!(comment.keep, 10);
        assert_eq!(comment.schema, "version");
        assert!(comment.excluded.contains("edited_at"));
        assert!(!comment.excluded.contains("updated_at"));
    }

    #[test]
    fn empty_file_is_valid() {
        let config = VersioningConfig::from_toml_str("").unwrap();
        assert_eq!(config, VersioningConfig::default());
        assert!(config.into_registry().unwrap().is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = VersioningConfig::from_toml_str("[kinds.article]\nkep = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn versionable_and_excluded_overlap_is_rejected() {
        let config = VersioningConfig::from_toml_str(
            "[kinds.article]\nversionable_fields = [\"title\"]\nexcluded_fields = [\"title\"]\n",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VersionableExcluded { .. })
        ));
    }

    #[test]
    fn blank_field_is_rejected() {
        let config =
            VersioningConfig::from_toml_str("[kinds.article]\nexcluded_fields = [\" \"]\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BlankField {
                list: "excluded_fields",
                ..
            })
        ));
    }

    #[test]
    fn blank_snapshot_type_is_rejected() {
        let config =
            VersioningConfig::from_toml_str("[kinds.article]\nsnapshot_type = \"\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BlankSnapshotType { .. })
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = VersioningConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vellum.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = VersioningConfig::load(&path).unwrap();
        assert_eq!(config.kinds.len(), 2);
    }

    #[test]
    fn builder_settings() {
        let settings = KindSettings::new("article")
            .keep(2)
            .versionable(["title", "title", "body"])
            .exclude(["view_count"])
            .schema("article_version");
        assert_eq!(settings.keep, 2);
        assert_eq!(settings.versionable, vec!["title", "body"]);
        assert_eq!(settings.tracked.len(), 2);
        assert!(settings.excluded.contains("view_count"));
        assert!(settings.excluded.contains("updated_at"));
        assert_eq!(settings.schema, "article_version");
    }
}
