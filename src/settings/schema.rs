//! Settings entity definitions.
//!
//! All types derive Serde traits so the excluded configuration layer can
//! deserialize them from config files.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::reconcile::Named;
use crate::settings::refresh::{MaxTime, RefreshRule};
use crate::transport::{QueryExecutor, TransportKind};

/// Engine sentinel for locally-filed data sources.
pub const NATIVE_ENGINE: &str = "native";

fn default_source_list_refresh_interval() -> u64 {
    15_000
}

fn default_source_reintrospect_interval() -> u64 {
    120_000
}

fn default_true() -> bool {
    true
}

/// Credentials for a cluster connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAuth {
    pub username: String,
    pub password: String,
}

/// Whether a cluster's source list is rescanned automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceListScan {
    Disable,
    #[default]
    Auto,
}

/// A configured connection to one query-capable backend technology.
///
/// Immutable value; replaced wholesale on update, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,

    /// Backend technology this cluster speaks.
    pub kind: TransportKind,

    /// Backend endpoint, e.g. `http://10.20.30.40:8082`.
    pub host: String,

    #[serde(default)]
    pub auth: Option<ClusterAuth>,

    /// Cadence of automatic source-list scans, in milliseconds.
    /// Zero disables the timer.
    #[serde(default = "default_source_list_refresh_interval")]
    pub source_list_refresh_interval_ms: u64,

    /// Cadence of scheduled re-introspection, in milliseconds.
    /// Zero disables the timer.
    #[serde(default = "default_source_reintrospect_interval")]
    pub source_reintrospect_interval_ms: u64,

    #[serde(default)]
    pub source_list_scan: SourceListScan,

    /// Rescan the source list when a read asks for fresh settings.
    #[serde(default)]
    pub source_list_refresh_on_load: bool,

    /// Re-introspect known sources when a read asks for fresh settings.
    #[serde(default)]
    pub source_reintrospect_on_load: bool,

    /// When true the re-introspection timer rescans the source list instead
    /// of re-introspecting known sources. Matches the historically observed
    /// behavior; set false for targeted re-introspection.
    #[serde(default = "default_true")]
    pub reintrospect_rescans_source_list: bool,
}

impl Cluster {
    pub fn new(name: impl Into<String>, kind: TransportKind, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            host: host.into(),
            auth: None,
            source_list_refresh_interval_ms: default_source_list_refresh_interval(),
            source_reintrospect_interval_ms: default_source_reintrospect_interval(),
            source_list_scan: SourceListScan::default(),
            source_list_refresh_on_load: false,
            source_reintrospect_on_load: false,
            reintrospect_rescans_source_list: true,
        }
    }
}

impl Named for Cluster {
    fn key(&self) -> &str {
        &self.name
    }
}

/// Value kind of one source attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    String,
    Number,
    Boolean,
    Time,
}

/// One column of a source's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Per-source behavior toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceOptions {
    /// Never introspect this source; its schema is hand-maintained.
    pub suppress_introspection: bool,

    /// Derive dimension definitions from introspected attributes.
    pub autofill_dimensions: bool,

    /// Derive measure definitions from introspected attributes.
    pub autofill_measures: bool,
}

/// A queryable data source, served by a cluster or a local file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub name: String,

    /// Name of the serving cluster, or [`NATIVE_ENGINE`] for local files.
    pub engine: String,

    /// Technology-specific locator: a table name, a file path.
    pub source: String,

    /// Live query handle, attached at runtime. Ignored by equality and
    /// serialization.
    #[serde(skip)]
    pub executor: Option<QueryExecutor>,

    /// Introspected schema, absent until first introspection.
    #[serde(default)]
    pub attributes: Option<Vec<Attribute>>,

    #[serde(default)]
    pub options: SourceOptions,

    #[serde(default)]
    pub refresh_rule: RefreshRule,

    #[serde(default)]
    pub max_time: Option<MaxTime>,
}

impl DataSource {
    pub fn new(name: impl Into<String>, engine: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: engine.into(),
            source: source.into(),
            executor: None,
            attributes: None,
            options: SourceOptions::default(),
            refresh_rule: RefreshRule::default(),
            max_time: None,
        }
    }

    /// Whether this source is served from a local file.
    pub fn is_native(&self) -> bool {
        self.engine == NATIVE_ENGINE
    }

    pub fn with_executor(mut self, executor: QueryExecutor) -> Self {
        self.executor = Some(executor);
        self
    }
}

impl PartialEq for DataSource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.engine == other.engine
            && self.source == other.source
            && self.attributes == other.attributes
            && self.options == other.options
            && self.refresh_rule == other.refresh_rule
            && self.max_time == other.max_time
    }
}

impl Named for DataSource {
    fn key(&self) -> &str {
        &self.name
    }
}

/// Errors found while validating a snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsValidationError {
    #[error("duplicate cluster name: {0}")]
    DuplicateClusterName(String),

    #[error("duplicate data source name: {0}")]
    DuplicateDataSourceName(String),

    #[error("data source '{name}' references unknown engine '{engine}'")]
    UnknownEngine { name: String, engine: String },

    #[error("cluster '{name}' has invalid host '{host}'")]
    InvalidHost { name: String, host: String },
}

/// The authoritative configuration snapshot: clusters plus data sources,
/// each unique by name.
///
/// Every mutating operation returns a new value; the existing snapshot is
/// never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub clusters: Vec<Cluster>,
    pub data_sources: Vec<DataSource>,
}

impl AppSettings {
    pub fn new(clusters: Vec<Cluster>, data_sources: Vec<DataSource>) -> Self {
        Self {
            clusters,
            data_sources,
        }
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|d| d.name == name)
    }

    /// All data sources served by the named cluster.
    pub fn data_sources_for_cluster(&self, cluster_name: &str) -> Vec<&DataSource> {
        self.data_sources
            .iter()
            .filter(|d| d.engine == cluster_name)
            .collect()
    }

    /// All locally-filed data sources.
    pub fn native_data_sources(&self) -> Vec<&DataSource> {
        self.data_sources_for_cluster(NATIVE_ENGINE)
    }

    /// New snapshot with the cluster appended, or replaced if one of the
    /// same name exists.
    pub fn add_cluster(&self, cluster: Cluster) -> Self {
        let mut next = self.clone();
        match next.clusters.iter_mut().find(|c| c.name == cluster.name) {
            Some(existing) => *existing = cluster,
            None => next.clusters.push(cluster),
        }
        next
    }

    /// New snapshot with the data source appended, or replaced in place if
    /// one of the same name exists.
    pub fn add_or_update_data_source(&self, data_source: DataSource) -> Self {
        let mut next = self.clone();
        match next
            .data_sources
            .iter_mut()
            .find(|d| d.name == data_source.name)
        {
            Some(existing) => *existing = data_source,
            None => next.data_sources.push(data_source),
        }
        next
    }

    /// New snapshot without the named data source.
    pub fn remove_data_source(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.data_sources.retain(|d| d.name != name);
        next
    }

    /// New snapshot with every data source's executor re-resolved.
    ///
    /// Sources for which `resolve` returns `None` keep no executor.
    pub fn attach_executors(
        &self,
        resolve: impl Fn(&DataSource) -> Option<QueryExecutor>,
    ) -> Self {
        let mut next = self.clone();
        for data_source in &mut next.data_sources {
            data_source.executor = resolve(data_source);
        }
        next
    }

    /// Check name uniqueness, engine references, and host syntax.
    pub fn validate(&self) -> Result<(), SettingsValidationError> {
        let mut seen = std::collections::HashSet::new();
        for cluster in &self.clusters {
            if !seen.insert(cluster.name.as_str()) {
                return Err(SettingsValidationError::DuplicateClusterName(
                    cluster.name.clone(),
                ));
            }
            if Url::parse(&cluster.host).is_err() {
                return Err(SettingsValidationError::InvalidHost {
                    name: cluster.name.clone(),
                    host: cluster.host.clone(),
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        for data_source in &self.data_sources {
            if !seen.insert(data_source.name.as_str()) {
                return Err(SettingsValidationError::DuplicateDataSourceName(
                    data_source.name.clone(),
                ));
            }
            if !data_source.is_native() && self.cluster(&data_source.engine).is_none() {
                return Err(SettingsValidationError::UnknownEngine {
                    name: data_source.name.clone(),
                    engine: data_source.engine.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str) -> Cluster {
        Cluster::new(name, TransportKind::Druid, "http://10.0.0.1:8082")
    }

    #[test]
    fn test_add_cluster_is_copy_on_write() {
        let settings = AppSettings::default();
        let next = settings.add_cluster(cluster("druid-east"));
        assert!(settings.clusters.is_empty());
        assert_eq!(next.clusters.len(), 1);
    }

    #[test]
    fn test_add_cluster_replaces_same_name() {
        let settings = AppSettings::default().add_cluster(cluster("druid-east"));
        let mut changed = cluster("druid-east");
        changed.source_list_refresh_interval_ms = 5_000;
        let next = settings.add_cluster(changed);
        assert_eq!(next.clusters.len(), 1);
        assert_eq!(next.clusters[0].source_list_refresh_interval_ms, 5_000);
    }

    #[test]
    fn test_add_or_update_data_source_preserves_order() {
        let settings = AppSettings::default()
            .add_or_update_data_source(DataSource::new("a", NATIVE_ENGINE, "a.json"))
            .add_or_update_data_source(DataSource::new("b", NATIVE_ENGINE, "b.json"));
        let mut updated = DataSource::new("a", NATIVE_ENGINE, "a-v2.json");
        updated.attributes = Some(vec![Attribute::new("id", AttributeKind::Number)]);
        let next = settings.add_or_update_data_source(updated);
        assert_eq!(next.data_sources[0].name, "a");
        assert_eq!(next.data_sources[0].source, "a-v2.json");
        assert_eq!(next.data_sources[1].name, "b");
    }

    #[test]
    fn test_equality_ignores_executor() {
        let a = DataSource::new("wiki", "druid-east", "wikipedia");
        let mut b = a.clone();
        b.executor = None;
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let settings = AppSettings::new(vec![cluster("c"), cluster("c")], vec![]);
        assert_eq!(
            settings.validate(),
            Err(SettingsValidationError::DuplicateClusterName("c".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_dangling_engine() {
        let settings = AppSettings::new(
            vec![],
            vec![DataSource::new("wiki", "druid-east", "wikipedia")],
        );
        assert!(matches!(
            settings.validate(),
            Err(SettingsValidationError::UnknownEngine { .. })
        ));
    }

    #[test]
    fn test_validate_accepts_native_sources_without_cluster() {
        let settings = AppSettings::new(
            vec![],
            vec![DataSource::new("local", NATIVE_ENGINE, "rows.json")],
        );
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_host() {
        let mut bad = cluster("c");
        bad.host = "not a url".to_string();
        let settings = AppSettings::new(vec![bad], vec![]);
        assert!(matches!(
            settings.validate(),
            Err(SettingsValidationError::InvalidHost { .. })
        ));
    }
}
