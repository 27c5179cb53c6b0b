//! Per query type definitions: the column map plus the statically registered
//! join procedures, comparison strategies and grouping rules behind it.

use super::{
    columns::{ColumnMap, ColumnSpec, VirtualTable},
    ido::IdoQuery,
    QueryContext, QueryType,
};
use crate::error::{QueryError, Result};

/// Adds the joins one virtual table needs to the query.
pub type JoinFn = fn(&mut IdoQuery) -> Result<()>;

/// Produces `(alias, expression)` replacements applied before normalization,
/// typically gated on the schema version.
pub type OverrideFn = fn(&QueryContext) -> Result<Vec<(&'static str, String)>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Host,
    Service,
}

impl ObjectKind {
    /// Alias of the `objects` row a facade of this kind is anchored on.
    pub fn object_alias(self) -> &'static str {
        match self {
            ObjectKind::Host => "ho",
            ObjectKind::Service => "so",
        }
    }

    pub fn objecttype_id(self) -> u8 {
        match self {
            ObjectKind::Host => 1,
            ObjectKind::Service => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Host => "host",
            ObjectKind::Service => "service",
        }
    }
}

/// The physical table a facade selects from, joined to its active object row.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub table: &'static str,
    pub alias: &'static str,
    pub predicates: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct UnionMember {
    pub query: QueryType,
    /// Aliases this member selects as `NULL`.
    pub placeholders: &'static [&'static str],
    /// Fixed select list. `None` forwards the parent's columns.
    pub columns: Option<Vec<ColumnSpec>>,
    /// Table to require and raw predicate to add once the member is built.
    pub restrict: Option<(VirtualTable, &'static str)>,
}

impl UnionMember {
    pub fn passthrough(query: QueryType, placeholders: &'static [&'static str]) -> Self {
        Self {
            query,
            placeholders,
            columns: None,
            restrict: None,
        }
    }

    pub fn fixed(query: QueryType, columns: Vec<ColumnSpec>) -> Self {
        Self {
            query,
            placeholders: &[],
            columns: Some(columns),
            restrict: None,
        }
    }

    pub fn restrict(mut self, table: VirtualTable, predicate: &'static str) -> Self {
        self.restrict = Some((table, predicate));
        self
    }
}

#[derive(Debug, Clone)]
pub struct UnionPlan {
    pub alias: &'static str,
    pub members: Vec<UnionMember>,
}

impl UnionPlan {
    pub fn is_passthrough(&self) -> bool {
        self.members.iter().all(|member| member.columns.is_none())
    }
}

#[derive(Debug, Clone)]
pub enum Base {
    Join(JoinFn),
    Union(UnionPlan),
}

/// `=`/`!=` renderings of one literal of an enumerated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumValue {
    pub literal: &'static str,
    pub eq: &'static str,
    pub ne: &'static str,
}

/// Column specific comparison strategies tried before the generic translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Compare the raw datetime column instead of its epoch expression.
    RawTimestamp {
        alias: &'static str,
        column: &'static str,
    },
    /// Compare the raw code column for known literals of a CASE expression.
    Enumerated {
        alias: &'static str,
        values: &'static [EnumValue],
    },
}

impl Comparison {
    pub fn alias(&self) -> &'static str {
        match self {
            Comparison::RawTimestamp { alias, .. } | Comparison::Enumerated { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Facade {
    pub query: QueryType,
    pub columns: ColumnMap,
    pub base: Base,
    pub base_tables: Vec<VirtualTable>,
    pub joins: Vec<(VirtualTable, JoinFn)>,
    pub custom_vars: bool,
    pub defaults: Vec<VirtualTable>,
    pub comparisons: Vec<Comparison>,
    pub overrides: Vec<OverrideFn>,
    /// `(table alias, physical table)` pairs whose primary keys always group.
    pub group_base: Vec<(&'static str, &'static str)>,
    /// Tables whose join multiplies rows and switches grouping on.
    pub group_origin: Vec<VirtualTable>,
    pub fixed_group: Vec<&'static str>,
    pub source: Option<SourceTable>,
    pub object: Option<ObjectKind>,
}

impl Facade {
    pub fn new(query: QueryType, columns: ColumnMap, base: Base) -> Self {
        Self {
            query,
            columns,
            base,
            base_tables: Vec::new(),
            joins: Vec::new(),
            custom_vars: false,
            defaults: Vec::new(),
            comparisons: Vec::new(),
            overrides: Vec::new(),
            group_base: Vec::new(),
            group_origin: Vec::new(),
            fixed_group: Vec::new(),
            source: None,
            object: None,
        }
    }

    pub fn base_tables(mut self, tables: &[VirtualTable]) -> Self {
        self.base_tables.extend_from_slice(tables);
        self
    }

    /// Declares (more) columns of `table`.
    pub fn table(mut self, table: VirtualTable, columns: &[(&str, &str)]) -> Self {
        self.columns = std::mem::take(&mut self.columns).table(table, columns);
        self
    }

    pub fn join(mut self, table: VirtualTable, join: JoinFn) -> Self {
        self.joins.push((table, join));
        self
    }

    pub fn custom_vars(mut self) -> Self {
        self.custom_vars = true;
        self
    }

    pub fn defaults(mut self, tables: &[VirtualTable]) -> Self {
        self.defaults.extend_from_slice(tables);
        self
    }

    pub fn comparison(mut self, comparison: Comparison) -> Self {
        self.comparisons.push(comparison);
        self
    }

    pub fn overrides(mut self, apply: OverrideFn) -> Self {
        self.overrides.push(apply);
        self
    }

    pub fn group(
        mut self,
        base: &[(&'static str, &'static str)],
        origin: &[VirtualTable],
    ) -> Self {
        self.group_base.extend_from_slice(base);
        self.group_origin.extend_from_slice(origin);
        self
    }

    pub fn fixed_group(mut self, columns: &[&'static str]) -> Self {
        self.fixed_group.extend_from_slice(columns);
        self
    }

    pub fn source(mut self, table: &'static str, alias: &'static str, predicates: &[&'static str]) -> Self {
        self.source = Some(SourceTable {
            table,
            alias,
            predicates: predicates.to_vec(),
        });
        self
    }

    pub fn object(mut self, kind: ObjectKind) -> Self {
        self.object = Some(kind);
        self
    }

    pub fn join_for(&self, table: VirtualTable) -> Option<JoinFn> {
        self.joins
            .iter()
            .find(|(registered, _)| *registered == table)
            .map(|(_, join)| *join)
    }

    /// Whether requiring `table` can succeed.
    pub fn resolves(&self, table: VirtualTable) -> bool {
        self.base_tables.contains(&table) || self.join_for(table).is_some()
    }

    pub fn union_plan(&self) -> Option<&UnionPlan> {
        match &self.base {
            Base::Union(plan) => Some(plan),
            Base::Join(_) => None,
        }
    }

    /// Checks that every declared table can be joined.
    pub fn validate(&self) -> Result<()> {
        let missing = |table: VirtualTable| QueryError::MissingJoin {
            query: self.query.as_str().to_string(),
            table: table.as_str().to_string(),
        };

        for table in self.columns.tables() {
            if !self.resolves(table.table) {
                return Err(missing(table.table));
            }
        }

        for comparison in &self.comparisons {
            if !self.columns.tables().any(|table| {
                table
                    .columns
                    .iter()
                    .any(|(alias, _)| alias == comparison.alias())
            }) {
                return Err(QueryError::InvalidColumn(comparison.alias().to_string()));
            }
        }

        if self.custom_vars {
            for table in [VirtualTable::Hosts, VirtualTable::Services] {
                if !self.resolves(table) {
                    return Err(missing(table));
                }
            }
        }

        if let Some(plan) = self.union_plan() {
            if plan.members.is_empty() {
                return Err(QueryError::UnionMismatch {
                    query: self.query.as_str().to_string(),
                    member: "<none>".to_string(),
                });
            }
        }

        Ok(())
    }
}
