//! Column maps, the alias index built from them and the column specs callers
//! select with.

use super::dialect::NormalizedColumnMap;
use indexmap::{map::Entry, IndexMap};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// A named group of columns sharing one join procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtualTable {
    Hosts,
    Hoststatus,
    Services,
    Servicestatus,
    Hostgroups,
    Servicegroups,
    Instances,
    Comments,
    Downtimes,
    History,
    Statehistory,
    Downtimehistory,
    Commenthistory,
    Flappinghistory,
    Notifications,
    Contactnotifications,
    Eventhistory,
    Hoststatussummary,
    Servicestatussummary,
}

impl VirtualTable {
    pub fn as_str(self) -> &'static str {
        match self {
            VirtualTable::Hosts => "hosts",
            VirtualTable::Hoststatus => "hoststatus",
            VirtualTable::Services => "services",
            VirtualTable::Servicestatus => "servicestatus",
            VirtualTable::Hostgroups => "hostgroups",
            VirtualTable::Servicegroups => "servicegroups",
            VirtualTable::Instances => "instances",
            VirtualTable::Comments => "comments",
            VirtualTable::Downtimes => "downtimes",
            VirtualTable::History => "history",
            VirtualTable::Statehistory => "statehistory",
            VirtualTable::Downtimehistory => "downtimehistory",
            VirtualTable::Commenthistory => "commenthistory",
            VirtualTable::Flappinghistory => "flappinghistory",
            VirtualTable::Notifications => "notifications",
            VirtualTable::Contactnotifications => "contactnotifications",
            VirtualTable::Eventhistory => "eventhistory",
            VirtualTable::Hoststatussummary => "hoststatussummary",
            VirtualTable::Servicestatussummary => "servicestatussummary",
        }
    }
}

impl fmt::Display for VirtualTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumns {
    pub table: VirtualTable,
    pub columns: Vec<(String, String)>,
}

/// Declarative virtual table -> alias -> expression map of one query type.
///
/// Tables keep their declaration order; the first declared table provides the
/// default column list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    tables: Vec<TableColumns>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(self, table: VirtualTable, columns: &[(&str, &str)]) -> Self {
        let owned = columns
            .iter()
            .map(|(alias, expr)| (alias.to_string(), expr.to_string()))
            .collect();
        self.table_owned(table, owned)
    }

    pub fn table_owned(mut self, table: VirtualTable, columns: Vec<(String, String)>) -> Self {
        match self.tables.iter_mut().find(|entry| entry.table == table) {
            Some(existing) => existing.columns.extend(columns),
            None => self.tables.push(TableColumns { table, columns }),
        }
        self
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableColumns> {
        self.tables.iter()
    }

    pub fn declares(&self, table: VirtualTable) -> bool {
        self.tables.iter().any(|entry| entry.table == table)
    }

    /// Replaces the expression of every declaration of `alias`. Returns whether
    /// anything matched.
    pub fn override_column(&mut self, alias: &str, expr: &str) -> bool {
        let mut matched = false;
        for (name, current) in self.tables.iter_mut().flat_map(|t| t.columns.iter_mut()) {
            if name == alias {
                *current = expr.to_string();
                matched = true;
            }
        }
        matched
    }
}

/// Columns every passthrough union parent exposes: `<alias>.<name>` for each name.
pub fn passthrough(alias: &str, names: &[&str]) -> Vec<(String, String)> {
    names
        .iter()
        .map(|name| (name.to_string(), format!("{alias}.{name}")))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEntry {
    pub table: VirtualTable,
    pub expr: String,
    pub timestamp: bool,
    pub collated: bool,
}

/// Alias -> (owning table, normalized expression), built once per query.
#[derive(Debug, Clone, Default)]
pub struct AliasIndex {
    entries: IndexMap<String, ColumnEntry>,
}

impl AliasIndex {
    /// Indexes `map`. An alias declared by more than one table keeps its first
    /// declaration.
    pub fn build(query: &str, map: &NormalizedColumnMap) -> Self {
        let mut entries: IndexMap<String, ColumnEntry> = IndexMap::new();

        for table in map.tables() {
            for column in &table.columns {
                match entries.entry(column.alias.clone()) {
                    Entry::Occupied(kept) => {
                        warn!(
                            query,
                            alias = %column.alias,
                            kept = %kept.get().table,
                            ignored = %table.table,
                            "alias declared by more than one virtual table"
                        );
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(ColumnEntry {
                            table: table.table,
                            expr: column.expr.clone(),
                            timestamp: column.timestamp,
                            collated: column.collated,
                        });
                    }
                }
            }
        }

        Self { entries }
    }

    pub fn get(&self, alias: &str) -> Option<&ColumnEntry> {
        self.entries.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn aliases_of(&self, table: VirtualTable) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(_, entry)| entry.table == table)
            .map(|(alias, _)| alias.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnSource {
    Alias(String),
    Null,
}

/// One output column: its name in the result set and where its value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub alias: String,
    pub source: ColumnSource,
}

impl ColumnSpec {
    pub fn renamed(alias: &str, source: &str) -> Self {
        Self {
            alias: alias.to_string(),
            source: ColumnSource::Alias(source.to_string()),
        }
    }

    pub fn null(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            source: ColumnSource::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        self.source == ColumnSource::Null
    }

    /// The alias to resolve against the column map, if any.
    pub fn source_alias(&self) -> Option<&str> {
        match &self.source {
            ColumnSource::Alias(alias) => Some(alias),
            ColumnSource::Null => None,
        }
    }
}

impl From<&str> for ColumnSpec {
    fn from(alias: &str) -> Self {
        Self::renamed(alias, alias)
    }
}

impl From<String> for ColumnSpec {
    fn from(alias: String) -> Self {
        Self {
            source: ColumnSource::Alias(alias.clone()),
            alias,
        }
    }
}

pub fn specs<I, S>(aliases: I) -> Vec<ColumnSpec>
where
    I: IntoIterator<Item = S>,
    S: Into<ColumnSpec>,
{
    aliases.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dialect::{normalize, Dialect};
    use pretty_assertions::assert_eq;

    fn map() -> ColumnMap {
        ColumnMap::new()
            .table(
                VirtualTable::Comments,
                &[("host_name", "ho.name1"), ("comment_data", "c.comment_data")],
            )
            .table(
                VirtualTable::Hosts,
                &[("host_alias", "h.alias"), ("host_name", "h.display_name")],
            )
    }

    #[test]
    fn first_declaration_wins() {
        let normalized = normalize(&map(), Dialect::Mysql, None);
        let index = AliasIndex::build("hostcomment", &normalized);

        let entry = index.get("host_name").expect("alias indexed");
        assert_eq!(entry.table, VirtualTable::Comments);
        assert_eq!(entry.expr, "ho.name1");
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn index_covers_every_declared_alias() {
        let map = map();
        let normalized = normalize(&map, Dialect::Pgsql, None);
        let index = AliasIndex::build("hostcomment", &normalized);

        for table in map.tables() {
            for (alias, _) in &table.columns {
                assert!(index.contains(alias), "{alias} missing from index");
            }
        }
        let hosts: Vec<_> = index.aliases_of(VirtualTable::Hosts).collect();
        assert_eq!(hosts, vec!["host_alias"]);
    }

    #[test]
    fn table_declarations_merge() {
        let map = ColumnMap::new()
            .table(VirtualTable::Hosts, &[("a", "h.a")])
            .table(VirtualTable::Hosts, &[("b", "h.b")]);
        assert_eq!(map.tables().count(), 1);
        assert!(map.declares(VirtualTable::Hosts));
        assert!(!map.declares(VirtualTable::Services));
    }

    #[test]
    fn override_replaces_the_expression() {
        let mut map = map();
        assert!(map.override_column("comment_data", "(NULL)"));
        assert!(!map.override_column("missing", "(NULL)"));
        let normalized = normalize(&map, Dialect::Mysql, None);
        assert_eq!(normalized.expression("comment_data"), Some("(NULL)"));
    }

    #[test]
    fn passthrough_prefixes_the_union_alias() {
        assert_eq!(
            passthrough("c", &["host_name", "comment_data"]),
            vec![
                ("host_name".to_string(), "c.host_name".to_string()),
                ("comment_data".to_string(), "c.comment_data".to_string()),
            ]
        );
    }
}
