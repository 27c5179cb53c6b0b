//! Statement model the query layer accumulates into and renders per dialect.

use super::dialect::Dialect;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub on: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Table { name: String, alias: String },
    Union { union: Union, alias: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Select {
    pub distinct: bool,
    pub columns: Vec<(String, String)>,
    pub from: Option<Source>,
    pub joins: Vec<Join>,
    pub wheres: Vec<String>,
    pub group: Vec<String>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<(u64, u64)>,
}

impl Select {
    pub fn from_table(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            from: Some(Source::Table {
                name: name.into(),
                alias: alias.into(),
            }),
            ..Self::default()
        }
    }

    pub fn join(&mut self, kind: JoinKind, table: String, alias: &str, on: String) {
        self.joins.push(Join {
            kind,
            table,
            alias: alias.to_string(),
            on,
        });
    }

    pub fn is_grouped(&self) -> bool {
        !self.group.is_empty()
    }

    pub fn render(&self, dialect: Dialect) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let columns: Vec<_> = self
                .columns
                .iter()
                .map(|(expr, alias)| format!("{expr} AS {}", dialect.quote_identifier(alias)))
                .collect();
            sql.push_str(&columns.join(", "));
        }

        self.render_tail(dialect, &mut sql, true);
        sql
    }

    /// `COUNT(*)` over the rows this statement would return.
    pub fn render_count(&self, dialect: Dialect, alias: &str) -> String {
        let count = dialect.quote_identifier("count");
        if self.is_grouped() || self.distinct {
            let mut inner = self.clone();
            inner.order.clear();
            inner.limit = None;
            return format!(
                "SELECT COUNT(*) AS {count} FROM ({}) {alias}",
                inner.render(dialect)
            );
        }

        let mut sql = format!("SELECT COUNT(*) AS {count}");
        self.render_tail(dialect, &mut sql, false);
        sql
    }

    fn render_tail(&self, dialect: Dialect, sql: &mut String, windowed: bool) {
        match &self.from {
            Some(Source::Table { name, alias }) => {
                sql.push_str(&format!(" FROM {name} {alias}"));
            }
            Some(Source::Union { union, alias }) => {
                sql.push_str(&format!(" FROM ({}) {alias}", union.render(dialect)));
            }
            None => {}
        }

        for join in &self.joins {
            let keyword = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            sql.push_str(&format!(
                " {keyword} {} {} ON {}",
                join.table, join.alias, join.on
            ));
        }

        if !self.wheres.is_empty() {
            let clause = if self.wheres.len() == 1 {
                self.wheres[0].clone()
            } else {
                self.wheres
                    .iter()
                    .map(|part| format!("({part})"))
                    .collect::<Vec<_>>()
                    .join(" AND ")
            };
            sql.push_str(&format!(" WHERE {clause}"));
        }

        if !self.group.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group.join(", ")));
        }

        if !windowed {
            return;
        }

        if !self.order.is_empty() {
            let order: Vec<_> = self
                .order
                .iter()
                .map(|(expr, direction)| format!("{expr} {}", direction.keyword()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }

        if let Some((limit, offset)) = self.limit {
            sql.push(' ');
            sql.push_str(&dialect.limit_clause(limit, offset));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Union {
    pub members: Vec<Select>,
    pub all: bool,
}

impl Union {
    pub fn render(&self, dialect: Dialect) -> String {
        let separator = if self.all { " UNION ALL " } else { " UNION " };
        self.members
            .iter()
            .map(|member| {
                let rendered = member.render(dialect);
                if member.order.is_empty() && member.limit.is_none() {
                    rendered
                } else {
                    format!("({rendered})")
                }
            })
            .collect::<Vec<_>>()
            .join(separator)
    }
}
