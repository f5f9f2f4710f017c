//! Managed-external records.

use crate::settings::{Attribute, Cluster, DataSource};

/// Schema descriptor of one external source: its backend locator and the
/// last introspected attribute list (empty until first introspection).
#[derive(Debug, Clone, PartialEq)]
pub struct External {
    pub source: String,
    pub attributes: Vec<Attribute>,
}

impl External {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            attributes: Vec::new(),
        }
    }
}

/// A controller's record for one discovered or configured source.
///
/// Owned exclusively by exactly one controller; the `source` locator is
/// unique within that controller's list.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedExternal {
    /// Display key, also the data source name in the snapshot.
    pub name: String,

    pub external: External,

    /// Whether this entry came from a source-list scan rather than the
    /// configured snapshot.
    pub auto_discovered: bool,

    /// Never introspect this entry; its schema is hand-maintained.
    pub suppress_introspection: bool,
}

impl ManagedExternal {
    pub fn discovered(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external: External::new(source),
            auto_discovered: true,
            suppress_introspection: false,
        }
    }

    /// Record for a source that was already present in the snapshot.
    pub fn from_data_source(data_source: &DataSource) -> Self {
        Self {
            name: data_source.name.clone(),
            external: External {
                source: data_source.source.clone(),
                attributes: data_source.attributes.clone().unwrap_or_default(),
            },
            auto_discovered: false,
            suppress_introspection: data_source.options.suppress_introspection,
        }
    }
}

/// Default display name for an auto-discovered source: the last segment of
/// its locator, minus any extension.
pub fn default_external_name(_cluster: &Cluster, source: &str) -> String {
    let segment = source.rsplit(['/', '\\']).next().unwrap_or(source);
    match segment.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
        _ => segment.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{AttributeKind, SourceOptions};
    use crate::transport::TransportKind;

    #[test]
    fn test_default_name_strips_path_and_extension() {
        let cluster = Cluster::new("c", TransportKind::Druid, "http://10.0.0.1:8082");
        assert_eq!(default_external_name(&cluster, "wikipedia"), "wikipedia");
        assert_eq!(default_external_name(&cluster, "/data/events.parquet"), "events");
        assert_eq!(default_external_name(&cluster, ".hidden"), ".hidden");
    }

    #[test]
    fn test_from_data_source_carries_options() {
        let mut data_source = DataSource::new("wiki", "druid-east", "wikipedia");
        data_source.options = SourceOptions {
            suppress_introspection: true,
            ..SourceOptions::default()
        };
        data_source.attributes = Some(vec![Attribute::new("page", AttributeKind::String)]);
        let managed = ManagedExternal::from_data_source(&data_source);
        assert_eq!(managed.name, "wiki");
        assert_eq!(managed.external.source, "wikipedia");
        assert!(managed.suppress_introspection);
        assert!(!managed.auto_discovered);
        assert_eq!(managed.external.attributes.len(), 1);
    }
}
