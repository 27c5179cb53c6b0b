//! A single query instance: resolves aliases to expressions, joins virtual
//! tables on demand and accumulates the statement.

use super::{
    columns::{AliasIndex, ColumnSpec, VirtualTable},
    dialect::{normalize, ConnectionDescriptor, Dialect},
    facade::{Base, Comparison, Facade, ObjectKind, UnionMember},
    filter::{Filter, FilterExpression, FilterValue, Operand, Predicate, Sign},
    sql::{Direction, JoinKind, Select, Source, Union},
    QueryContext, QueryType,
};
use crate::{
    error::{QueryError, Result},
    time,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

static CUSTOMVAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^_(host|service)_([a-z0-9_]+)$").expect("valid regex"));

/// Primary key columns grouping falls back to for each joined table.
fn group_keys(table: VirtualTable) -> &'static [(&'static str, &'static str)] {
    match table {
        VirtualTable::Hosts => &[("h", "hosts")],
        VirtualTable::Hostgroups => &[("hgo", "objects"), ("hg", "hostgroups")],
        VirtualTable::Hoststatus => &[("hs", "hoststatus")],
        VirtualTable::Services => &[("so", "objects"), ("s", "services")],
        VirtualTable::Servicestatus => &[("ss", "servicestatus")],
        VirtualTable::Servicegroups => &[("sgo", "objects"), ("sg", "servicegroups")],
        VirtualTable::Instances => &[("i", "instances")],
        VirtualTable::Contactnotifications => &[("co", "objects")],
        _ => &[],
    }
}

pub struct IdoQuery {
    ctx: QueryContext,
    query: QueryType,
    facade: &'static Facade,
    index: AliasIndex,
    joined: HashSet<VirtualTable>,
    customvars: IndexMap<String, String>,
    select: Select,
    columns: Vec<ColumnSpec>,
    order_aliases: Vec<String>,
    members: Vec<IdoQuery>,
}

impl IdoQuery {
    /// Builds a query of type `query` selecting `columns`, or the facade's
    /// default columns when `None`.
    pub fn new(
        ctx: &QueryContext,
        query: QueryType,
        columns: Option<Vec<ColumnSpec>>,
    ) -> Result<Self> {
        let facade = query.facade();
        facade.validate()?;

        let mut map = facade.columns.clone();
        for apply in &facade.overrides {
            for (alias, expr) in apply(ctx)? {
                map.override_column(alias, &expr);
            }
        }

        let dialect = ctx.connection.dialect;
        let version = match dialect {
            Dialect::Pgsql => Some(ctx.schema_version()?),
            Dialect::Mysql | Dialect::Oracle => None,
        };
        let normalized = normalize(&map, dialect, version.as_ref());
        let index = AliasIndex::build(query.as_str(), &normalized);

        let mut this = Self {
            ctx: ctx.clone(),
            query,
            facade,
            index,
            joined: HashSet::new(),
            customvars: IndexMap::new(),
            select: Select::default(),
            columns: Vec::new(),
            order_aliases: Vec::new(),
            members: Vec::new(),
        };

        this.join_base_tables()?;

        let columns = match columns {
            Some(columns) => columns,
            None => this
                .default_columns()
                .into_iter()
                .map(ColumnSpec::from)
                .collect(),
        };
        this.columns(columns)?;

        Ok(this)
    }

    fn join_base_tables(&mut self) -> Result<()> {
        let facade = self.facade;
        match &facade.base {
            Base::Join(join) => {
                self.joined.extend(facade.base_tables.iter().copied());
                join(self)?;
            }
            Base::Union(plan) => {
                self.joined.extend(facade.base_tables.iter().copied());
                for member in &plan.members {
                    let columns = member.columns.clone().unwrap_or_default();
                    let mut sub = IdoQuery::new(&self.ctx, member.query, Some(columns))?;
                    if let Some((table, predicate)) = member.restrict {
                        sub.require_virtual_table(table)?;
                        sub.where_raw(predicate);
                    }
                    self.members.push(sub);
                }
            }
        }
        Ok(())
    }

    pub fn query_type(&self) -> QueryType {
        self.query
    }

    pub fn facade(&self) -> &'static Facade {
        self.facade
    }

    pub fn context(&self) -> &QueryContext {
        &self.ctx
    }

    pub fn connection(&self) -> &ConnectionDescriptor {
        &self.ctx.connection
    }

    pub fn dialect(&self) -> Dialect {
        self.ctx.connection.dialect
    }

    pub fn members(&self) -> &[IdoQuery] {
        &self.members
    }

    pub fn is_union(&self) -> bool {
        self.facade.union_plan().is_some()
    }

    /// Kind of object the facade is anchored on.
    pub fn object_kind(&self) -> Result<ObjectKind> {
        self.facade.object.ok_or_else(|| QueryError::MissingJoin {
            query: self.query.as_str().to_string(),
            table: "objects".to_string(),
        })
    }

    /// `<prefix><name>`
    pub fn table(&self, name: &str) -> String {
        self.ctx.connection.table(name)
    }

    /// `<alias>.<primary key of table>`
    pub fn key(&self, alias: &str, table: &str) -> String {
        format!("{alias}.{}", self.dialect().primary_key(table))
    }

    pub fn set_from(&mut self, table: &str, alias: &str) {
        self.select.from = Some(Source::Table {
            name: self.table(table),
            alias: alias.to_string(),
        });
    }

    pub fn join(&mut self, kind: JoinKind, table: &str, alias: &str, on: String) {
        let table = self.table(table);
        self.select.join(kind, table, alias, on);
    }

    pub fn where_raw(&mut self, sql: &str) {
        self.select.wheres.push(sql.to_string());
    }

    pub fn has_joined(&self, table: VirtualTable) -> bool {
        self.joined.contains(&table)
    }

    /// Joins `table` unless it already is. The table counts as joined before its
    /// procedure runs, so procedures may require other tables freely.
    pub fn require_virtual_table(&mut self, table: VirtualTable) -> Result<()> {
        if self.joined.contains(&table) {
            return Ok(());
        }

        let join = self
            .facade
            .join_for(table)
            .ok_or_else(|| QueryError::MissingJoin {
                query: self.query.as_str().to_string(),
                table: table.as_str().to_string(),
            })?;

        self.joined.insert(table);
        debug!(query = self.query.as_str(), table = %table, "joining virtual table");
        join(self)
    }

    /// Resolves `alias` to its expression, joining whatever it lives in.
    pub fn require_column(&mut self, alias: &str) -> Result<String> {
        if let Some(entry) = self.index.get(alias) {
            let (table, expr) = (entry.table, entry.expr.clone());
            if !self.is_union() {
                self.require_virtual_table(table)?;
            }
            return Ok(expr);
        }

        if alias.starts_with('_') && self.allows_custom_vars() && !self.is_union() {
            return self.require_custom_var(alias);
        }

        Err(QueryError::InvalidColumn(alias.to_string()))
    }

    fn require_custom_var(&mut self, alias: &str) -> Result<String> {
        let (kind, name) = custom_var_parts(alias)
            .ok_or_else(|| QueryError::InvalidCustomVar(alias.to_string()))?;
        let key = format!("_{kind}_{name}");

        if let Some(join_alias) = self.customvars.get(&key) {
            return Ok(format!("{join_alias}.varvalue"));
        }

        let object_column = if self.has_joined(VirtualTable::Services) {
            format!("s.{kind}_object_id")
        } else if kind == "host" {
            self.require_virtual_table(VirtualTable::Hosts)?;
            "h.host_object_id".to_string()
        } else {
            self.require_virtual_table(VirtualTable::Services)?;
            "s.service_object_id".to_string()
        };

        let join_alias = format!("{}cv_{name}", &kind[..1]);
        let on = self
            .dialect()
            .customvar_condition(&object_column, &join_alias, &name);
        self.join(JoinKind::Left, "customvariablestatus", &join_alias, on);
        debug!(query = self.query.as_str(), alias = %key, join = %join_alias, "joining custom variable");

        self.customvars.insert(key, join_alias.clone());
        Ok(format!("{join_alias}.varvalue"))
    }

    /// Replaces the select list.
    pub fn columns(&mut self, columns: Vec<ColumnSpec>) -> Result<&mut Self> {
        if self.is_union() {
            for spec in &columns {
                if let Some(source) = spec.source_alias() {
                    if !self.index.contains(source) {
                        return Err(QueryError::InvalidColumn(source.to_string()));
                    }
                }
            }
            self.columns = columns;
            self.forward_columns()?;
        } else {
            for spec in &columns {
                if let Some(source) = spec.source_alias() {
                    self.require_column(source)?;
                }
            }
            self.columns = columns;
        }
        Ok(self)
    }

    /// Pushes the aliases a passthrough union needs down to every member.
    fn forward_columns(&mut self) -> Result<()> {
        let facade = self.facade;
        let Some(plan) = facade.union_plan() else {
            return Ok(());
        };
        if !plan.is_passthrough() {
            return Ok(());
        }

        let mut needed: Vec<String> = Vec::new();
        let selected = self.columns.iter().filter_map(ColumnSpec::source_alias);
        for alias in selected.chain(self.order_aliases.iter().map(String::as_str)) {
            if !needed.iter().any(|known| known == alias) {
                needed.push(alias.to_string());
            }
        }

        for (member, spec) in self.members.iter_mut().zip(&plan.members) {
            let specs = member_specs(member, spec, &needed);
            member.columns(specs)?;
        }
        Ok(())
    }

    /// Output column names, in select order.
    pub fn output_aliases(&self) -> Vec<&str> {
        self.columns.iter().map(|spec| spec.alias.as_str()).collect()
    }

    /// Every alias the facade declares, in declaration order.
    pub fn aliases(&self) -> Vec<&str> {
        self.index.aliases().collect()
    }

    pub fn declares(&self, alias: &str) -> bool {
        self.index.contains(alias)
    }

    pub fn where_(&mut self, alias: &str, value: &str) -> Result<&mut Self> {
        self.add_filter(&Filter::equals(alias, value))?;
        Ok(self)
    }

    /// Translates `filter` into the WHERE clause. Union parents hand it to every
    /// member instead.
    pub fn add_filter(&mut self, filter: &Filter) -> Result<&mut Self> {
        if self.is_union() {
            for member in &mut self.members {
                member.add_filter(filter)?;
            }
            return Ok(self);
        }

        if let Some(predicate) = self.translate(filter)? {
            if let Some(sql) = predicate.render(self.dialect())? {
                self.select.wheres.push(sql);
            }
        }
        Ok(self)
    }

    fn translate(&mut self, filter: &Filter) -> Result<Option<Predicate>> {
        let chain = |this: &mut Self, children: &[Filter]| -> Result<Vec<Predicate>> {
            let mut out = Vec::with_capacity(children.len());
            for child in children {
                if let Some(predicate) = this.translate(child)? {
                    out.push(predicate);
                }
            }
            Ok(out)
        };

        Ok(match filter {
            Filter::And(children) => Some(Predicate::All(chain(self, children)?)),
            Filter::Or(children) => Some(Predicate::Any(chain(self, children)?)),
            Filter::Not(children) => Some(Predicate::Not(chain(self, children)?)),
            Filter::Expression(expr) if expr.is_wildcard() => None,
            Filter::Expression(expr) => Some(self.translate_expression(expr)?),
        })
    }

    fn translate_expression(&mut self, expr: &FilterExpression) -> Result<Predicate> {
        if let Some(predicate) = self.structured_comparison(expr)? {
            return Ok(predicate);
        }

        let column = self.require_column(&expr.column)?;

        if self.is_timestamp(&expr.column) {
            let operand = match &expr.value {
                FilterValue::Scalar(value) => {
                    Operand::Sql(self.epoch(&expr.column, value)?.to_string())
                }
                FilterValue::List(values) => Operand::SqlList(
                    values
                        .iter()
                        .map(|value| self.epoch(&expr.column, value).map(|e| e.to_string()))
                        .collect::<Result<_>>()?,
                ),
            };
            return Ok(Predicate::Compare {
                column,
                sign: expr.sign,
                operand,
            });
        }

        let lower = self.dialect() == Dialect::Pgsql && self.is_case_insensitive(&expr.column);
        let (column, operand) = match &expr.value {
            FilterValue::Scalar(value) if lower => {
                (format!("LOWER({column})"), Operand::Literal(value.to_lowercase()))
            }
            FilterValue::Scalar(value) => (column, Operand::Literal(value.clone())),
            FilterValue::List(values) if lower => (
                format!("LOWER({column})"),
                Operand::Literals(values.iter().map(|v| v.to_lowercase()).collect()),
            ),
            FilterValue::List(values) => (column, Operand::Literals(values.clone())),
        };

        Ok(Predicate::Compare {
            column,
            sign: expr.sign,
            operand,
        })
    }

    fn structured_comparison(&mut self, expr: &FilterExpression) -> Result<Option<Predicate>> {
        let facade = self.facade;
        let Some(comparison) = facade
            .comparisons
            .iter()
            .find(|comparison| comparison.alias() == expr.column)
        else {
            return Ok(None);
        };

        match comparison {
            Comparison::RawTimestamp { alias, column } => {
                self.require_column(alias)?;
                let operand = match &expr.value {
                    FilterValue::Scalar(value) => Operand::Sql(self.datetime(alias, value)?),
                    FilterValue::List(values) => Operand::SqlList(
                        values
                            .iter()
                            .map(|value| self.datetime(alias, value))
                            .collect::<Result<_>>()?,
                    ),
                };
                Ok(Some(Predicate::Compare {
                    column: column.to_string(),
                    sign: expr.sign,
                    operand,
                }))
            }
            Comparison::Enumerated { alias, values } => {
                let FilterValue::Scalar(value) = &expr.value else {
                    return Ok(None);
                };
                let Some(known) = values.iter().find(|known| known.literal == value) else {
                    return Ok(None);
                };
                let sql = match expr.sign {
                    Sign::Eq => known.eq,
                    Sign::Ne => known.ne,
                    _ => return Ok(None),
                };
                self.require_column(alias)?;
                Ok(Some(Predicate::Raw(sql.to_string())))
            }
        }
    }

    fn epoch(&self, alias: &str, value: &str) -> Result<i64> {
        let trimmed = value.trim();
        if let Ok(seconds) = trimmed.parse::<i64>() {
            return Ok(seconds);
        }

        time::epoch_seconds(trimmed, self.ctx.now).ok_or_else(|| QueryError::InvalidValue {
            column: alias.to_string(),
            value: value.to_string(),
        })
    }

    fn datetime(&self, alias: &str, value: &str) -> Result<String> {
        let seconds = self.epoch(alias, value)?;
        if DateTime::<Utc>::from_timestamp(seconds, 0).is_none() {
            return Err(QueryError::InvalidValue {
                column: alias.to_string(),
                value: value.to_string(),
            });
        }
        Ok(self.dialect().epoch_datetime(seconds))
    }

    pub fn order(&mut self, alias: &str, direction: Direction) -> Result<&mut Self> {
        let expr = if self.is_union() {
            let expr = self
                .index
                .get(alias)
                .map(|entry| entry.expr.clone())
                .ok_or_else(|| QueryError::InvalidColumn(alias.to_string()))?;
            if !self.order_aliases.iter().any(|known| known == alias) {
                self.order_aliases.push(alias.to_string());
                self.forward_columns()?;
            }
            expr
        } else {
            let expr = self.require_column(alias)?;
            if !self.order_aliases.iter().any(|known| known == alias) {
                self.order_aliases.push(alias.to_string());
            }
            expr
        };

        let expr = if self.dialect() == Dialect::Pgsql && self.is_case_insensitive(alias) {
            format!("LOWER({expr})")
        } else {
            expr
        };
        self.select.order.push((expr, direction));
        Ok(self)
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.select.distinct = true;
        self
    }

    pub fn limit(&mut self, count: u64, offset: u64) -> &mut Self {
        self.select.limit = Some((count, offset));
        self
    }

    pub fn is_timestamp(&self, alias: &str) -> bool {
        self.index.get(alias).is_some_and(|entry| entry.timestamp)
            || self.members.iter().any(|member| member.is_timestamp(alias))
    }

    pub fn is_case_insensitive(&self, alias: &str) -> bool {
        if self.dialect() == Dialect::Oracle {
            return false;
        }
        self.index.get(alias).is_some_and(|entry| entry.collated)
            || self.members.iter().any(|member| member.is_case_insensitive(alias))
    }

    /// The normalized expression behind a declared alias.
    pub fn mapped_field(&self, alias: &str) -> Option<&str> {
        self.index.get(alias).map(|entry| entry.expr.as_str())
    }

    /// Aliases selected when the caller names none.
    pub fn default_columns(&self) -> Vec<String> {
        let tables: Vec<VirtualTable> = if self.facade.defaults.is_empty() {
            self.facade.columns.tables().take(1).map(|t| t.table).collect()
        } else {
            self.facade.defaults.clone()
        };

        tables
            .into_iter()
            .flat_map(|table| self.index.aliases_of(table).map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    pub fn allows_custom_vars(&self) -> bool {
        if self.is_union() {
            return !self.members.is_empty()
                && self.members.iter().all(IdoQuery::allows_custom_vars);
        }
        self.facade.custom_vars
    }

    fn resolved_expr(&self, alias: &str) -> Result<String> {
        if let Some(expr) = self.mapped_field(alias) {
            return Ok(expr.to_string());
        }
        custom_var_parts(alias)
            .and_then(|(kind, name)| self.customvars.get(&format!("_{kind}_{name}")))
            .map(|join_alias| format!("{join_alias}.varvalue"))
            .ok_or_else(|| QueryError::InvalidColumn(alias.to_string()))
    }

    fn group_columns(&self) -> Vec<String> {
        if !self.facade.fixed_group.is_empty() {
            return self.facade.fixed_group.iter().map(|c| c.to_string()).collect();
        }
        if !self
            .facade
            .group_origin
            .iter()
            .any(|table| self.joined.contains(table))
        {
            return Vec::new();
        }

        let strict = self.dialect() != Dialect::Mysql;
        let mut group = Vec::new();
        let mut push = |column: String| {
            if !group.contains(&column) {
                group.push(column);
            }
        };

        for (alias, table) in &self.facade.group_base {
            push(self.key(alias, table));
        }

        let selected = self.columns.iter().filter_map(ColumnSpec::source_alias);
        let ordered = self
            .order_aliases
            .iter()
            .map(String::as_str)
            .filter(|_| strict);

        for alias in selected.chain(ordered) {
            match self.index.get(alias) {
                Some(entry) if strict || self.facade.group_origin.contains(&entry.table) => {
                    for (table_alias, table) in group_keys(entry.table) {
                        push(self.key(table_alias, table));
                    }
                }
                Some(_) => {}
                None if strict => {
                    if let Ok(expr) = self.resolved_expr(alias) {
                        push(expr);
                    }
                }
                None => {}
            }
        }

        group
    }

    /// Builds the statement, including every union member.
    pub fn select_statement(&self) -> Result<Select> {
        let mut select = self.select.clone();
        select.columns = self
            .columns
            .iter()
            .map(|spec| {
                let expr = match spec.source_alias() {
                    Some(source) => self.resolved_expr(source)?,
                    None => "NULL".to_string(),
                };
                Ok((expr, spec.alias.clone()))
            })
            .collect::<Result<_>>()?;

        if let Some(plan) = self.facade.union_plan() {
            let mut members = Vec::with_capacity(self.members.len());
            let expected = self.members.first().map(IdoQuery::output_aliases);
            for member in &self.members {
                if Some(member.output_aliases()) != expected {
                    return Err(QueryError::UnionMismatch {
                        query: self.query.as_str().to_string(),
                        member: member.query.as_str().to_string(),
                    });
                }
                members.push(member.select_statement()?);
            }
            select.from = Some(Source::Union {
                union: Union { members, all: true },
                alias: plan.alias.to_string(),
            });
        }

        select.group = self.group_columns();
        Ok(select)
    }

    pub fn to_sql(&self) -> Result<String> {
        Ok(self.select_statement()?.render(self.dialect()))
    }

    pub fn count_statement(&self) -> Result<String> {
        Ok(self
            .select_statement()?
            .render_count(self.dialect(), "count_query"))
    }
}

fn custom_var_parts(alias: &str) -> Option<(String, String)> {
    let captures = CUSTOMVAR.captures(alias)?;
    Some((
        captures[1].to_ascii_lowercase(),
        captures[2].to_ascii_lowercase(),
    ))
}

fn member_specs(member: &IdoQuery, plan: &UnionMember, aliases: &[String]) -> Vec<ColumnSpec> {
    aliases
        .iter()
        .map(|alias| {
            if plan.placeholders.contains(&alias.as_str()) || !member.declares(alias) {
                ColumnSpec::null(alias)
            } else {
                ColumnSpec::from(alias.as_str())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{dialect::Dialect, version::SchemaVersion, QueryContext};
    use pretty_assertions::assert_eq;

    fn ctx(dialect: Dialect) -> QueryContext {
        QueryContext::fixed(
            ConnectionDescriptor::new(dialect, "icinga_"),
            Some(SchemaVersion::new(1, 14, 3)),
        )
    }

    fn hoststatus(columns: &[&str]) -> IdoQuery {
        IdoQuery::new(
            &ctx(Dialect::Mysql),
            QueryType::Hoststatus,
            Some(columns.iter().map(|c| ColumnSpec::from(*c)).collect()),
        )
        .expect("hoststatus query")
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn host_name_and_state_join_only_hoststatus() {
        let query = hoststatus(&["host_name", "host_state"]);
        let sql = query.to_sql().unwrap();

        assert!(query.has_joined(VirtualTable::Hoststatus));
        assert!(!query.has_joined(VirtualTable::Services));
        assert!(!query.has_joined(VirtualTable::Hostgroups));
        assert_eq!(
            sql,
            "SELECT ho.name1 AS `host_name`, \
             CASE WHEN hs.has_been_checked = 0 OR hs.has_been_checked IS NULL THEN 99 ELSE hs.current_state END AS `host_state` \
             FROM icinga_objects ho \
             INNER JOIN icinga_hosts h ON h.host_object_id = ho.object_id AND ho.is_active = 1 AND ho.objecttype_id = 1 \
             INNER JOIN icinga_hoststatus hs ON hs.host_object_id = ho.object_id"
        );
    }

    #[test]
    fn requiring_a_table_twice_joins_once() {
        let mut query = hoststatus(&["host_name"]);
        for _ in 0..3 {
            query.require_virtual_table(VirtualTable::Hostgroups).unwrap();
        }
        query.require_column("hostgroup_name").unwrap();
        let sql = query.to_sql().unwrap();
        assert_eq!(count(&sql, "icinga_hostgroup_members hgm"), 1, "sql: {sql}");
    }

    #[test]
    fn alias_resolution_is_stable() {
        let mut query = hoststatus(&["host_name"]);
        let first = query.require_column("host_output").unwrap();
        let second = query.require_column("host_output").unwrap();
        assert_eq!(first, second);
        assert_eq!(count(&query.to_sql().unwrap(), "icinga_hoststatus hs"), 1);
    }

    #[test]
    fn unknown_alias_is_rejected() {
        let err = IdoQuery::new(
            &ctx(Dialect::Mysql),
            QueryType::Hoststatus,
            Some(vec![ColumnSpec::from("no_such_column")]),
        )
        .err()
        .expect("invalid column");
        assert_eq!(err.to_string(), "Got invalid column: no_such_column");
    }

    #[test]
    fn custom_var_is_joined_once() {
        let mut query = hoststatus(&["host_name", "_host_FOO"]);
        query.where_("_host_foo", "bar").unwrap();
        query.order("_HOST_foo", Direction::Asc).unwrap();
        let sql = query.to_sql().unwrap();

        assert_eq!(count(&sql, "LEFT JOIN icinga_customvariablestatus"), 1, "sql: {sql}");
        assert!(sql.contains(
            "LEFT JOIN icinga_customvariablestatus hcv_foo ON h.host_object_id = hcv_foo.object_id \
             AND hcv_foo.varname = 'foo' COLLATE latin1_general_ci"
        ));
        assert!(sql.contains("hcv_foo.varvalue AS `_host_FOO`"));
        assert!(sql.contains("WHERE hcv_foo.varvalue = 'bar'"));
    }

    #[test]
    fn service_custom_var_uses_services_join() {
        let query = hoststatus(&["host_name", "_service_owner"]);
        let sql = query.to_sql().unwrap();
        assert!(query.has_joined(VirtualTable::Services));
        assert!(
            sql.contains("ON s.service_object_id = scv_owner.object_id"),
            "sql: {sql}"
        );
    }

    #[test]
    fn malformed_custom_var_is_rejected() {
        let err = IdoQuery::new(
            &ctx(Dialect::Mysql),
            QueryType::Hoststatus,
            Some(vec![ColumnSpec::from("_contact_foo")]),
        )
        .err()
        .expect("invalid custom var");
        assert!(matches!(err, QueryError::InvalidCustomVar(alias) if alias == "_contact_foo"));
    }

    #[test]
    fn wildcard_filter_is_a_no_op() {
        let mut query = hoststatus(&["host_name"]);
        let before = query.to_sql().unwrap();
        query.where_("hostgroup_name", "*").unwrap();
        query
            .add_filter(&Filter::And(vec![Filter::equals("service_description", "*")]))
            .unwrap();

        assert!(!query.has_joined(VirtualTable::Hostgroups));
        assert!(!query.has_joined(VirtualTable::Services));
        assert_eq!(query.to_sql().unwrap(), before);
    }

    #[test]
    fn timestamp_filters_convert_relative_values() {
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let ctx = ctx(Dialect::Mysql).with_now(now);
        let mut query = IdoQuery::new(
            &ctx,
            QueryType::Hoststatus,
            Some(vec![ColumnSpec::from("host_name")]),
        )
        .unwrap();
        query
            .add_filter(&Filter::expression("host_last_check", Sign::Gt, "-1 hour"))
            .unwrap();
        let sql = query.to_sql().unwrap();
        assert!(
            sql.contains("UNIX_TIMESTAMP(hs.last_check) > 1699996400"),
            "sql: {sql}"
        );

        let err = query
            .add_filter(&Filter::expression("host_last_check", Sign::Gt, "soonish"))
            .err()
            .expect("invalid value");
        assert!(matches!(err, QueryError::InvalidValue { .. }));

        let err = query
            .add_filter(&Filter::expression(
                "host_last_check",
                Sign::Gt,
                "-9999999999999999 days",
            ))
            .err()
            .expect("offset out of range");
        assert!(matches!(err, QueryError::InvalidValue { .. }), "got: {err:?}");
    }

    #[test]
    fn mapped_fields_follow_the_dialect() {
        let mysql = hoststatus(&["host_name"]);
        assert_eq!(mysql.mapped_field("host_name"), Some("ho.name1"));
        assert_eq!(mysql.mapped_field("no_such_column"), None);
        assert_eq!(mysql.mapped_field("_host_location"), None);

        let pgsql = IdoQuery::new(
            &ctx(Dialect::Pgsql),
            QueryType::Hoststatus,
            Some(vec![ColumnSpec::from("host_name")]),
        )
        .unwrap();
        assert_eq!(
            mysql.mapped_field("host_display_name"),
            Some("h.display_name COLLATE latin1_general_ci")
        );
        assert_eq!(pgsql.mapped_field("host_display_name"), Some("h.display_name"));
    }

    #[test]
    fn pgsql_lowers_collated_columns() {
        let mut query = IdoQuery::new(
            &ctx(Dialect::Pgsql),
            QueryType::Hoststatus,
            Some(vec![ColumnSpec::from("host")]),
        )
        .unwrap();
        query.where_("host", "Web*").unwrap();
        query.order("host", Direction::Desc).unwrap();
        let sql = query.to_sql().unwrap();

        assert!(sql.contains("WHERE LOWER(ho.name1) LIKE 'web%'"), "sql: {sql}");
        assert!(sql.ends_with("ORDER BY LOWER(ho.name1) DESC"), "sql: {sql}");
    }

    #[test]
    fn grouping_starts_with_multiplying_joins() {
        let mut query = hoststatus(&["host_name", "hostgroup_name"]);
        let sql = query.to_sql().unwrap();
        assert!(
            sql.ends_with("GROUP BY ho.object_id, h.host_id, hgo.object_id, hg.hostgroup_id"),
            "sql: {sql}"
        );

        query.distinct();
        let count = query.count_statement().unwrap();
        assert!(count.starts_with("SELECT COUNT(*) AS `count` FROM (SELECT DISTINCT"));
    }

    #[test]
    fn ungrouped_queries_have_no_group_clause() {
        let sql = hoststatus(&["host_name", "host_output"]).to_sql().unwrap();
        assert!(!sql.contains("GROUP BY"), "sql: {sql}");
    }

    #[test]
    fn union_filters_reach_every_member() {
        let mut query = IdoQuery::new(&ctx(Dialect::Mysql), QueryType::Comment, None).unwrap();
        query.where_("comment_author", "icingaadmin").unwrap();

        assert_eq!(query.members().len(), 2);
        for member in query.members() {
            let sql = member.to_sql().unwrap();
            assert!(
                sql.contains("c.author_name COLLATE latin1_general_ci = 'icingaadmin'"),
                "{} sql: {sql}",
                member.query_type()
            );
        }
        let parent = query.select_statement().unwrap();
        assert!(parent.wheres.is_empty());
    }

    #[test]
    fn union_members_share_one_column_order() {
        let query = IdoQuery::new(&ctx(Dialect::Pgsql), QueryType::Downtime, None).unwrap();
        let expected = query.output_aliases();
        for member in query.members() {
            assert_eq!(member.output_aliases(), expected);
        }
        let sql = query.to_sql().unwrap();
        assert!(sql.contains("NULL AS \"service_description\""), "sql: {sql}");
    }

    #[test]
    fn union_order_requires_the_alias_on_members() {
        let mut query = IdoQuery::new(
            &ctx(Dialect::Mysql),
            QueryType::Comment,
            Some(vec![ColumnSpec::from("comment_data")]),
        )
        .unwrap();
        query.order("comment_timestamp", Direction::Desc).unwrap();

        for member in query.members() {
            assert_eq!(
                member.output_aliases(),
                vec!["comment_data", "comment_timestamp"]
            );
        }
        let sql = query.to_sql().unwrap();
        assert!(sql.ends_with("ORDER BY c.comment_timestamp DESC"), "sql: {sql}");
        assert!(sql.starts_with("SELECT c.comment_data AS `comment_data` FROM (SELECT"));
    }

    #[test]
    fn union_rejects_custom_var_columns() {
        let err = IdoQuery::new(
            &ctx(Dialect::Mysql),
            QueryType::Comment,
            Some(vec![ColumnSpec::from("_host_foo")]),
        )
        .err()
        .expect("custom vars are member only");
        assert!(matches!(err, QueryError::InvalidColumn(_)));
    }

    #[test]
    fn union_allows_custom_vars_only_if_all_members_do() {
        let comment = IdoQuery::new(&ctx(Dialect::Mysql), QueryType::Comment, None).unwrap();
        assert!(comment.allows_custom_vars());

        let summary =
            IdoQuery::new(&ctx(Dialect::Mysql), QueryType::Statussummary, None).unwrap();
        assert!(summary.allows_custom_vars());
    }
}
