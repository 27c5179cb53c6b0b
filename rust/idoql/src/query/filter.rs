//! Logical filter trees and the resolved predicates they translate into.

use super::dialect::Dialect;
use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Sign {
    pub fn as_sql(self) -> &'static str {
        match self {
            Sign::Eq => "=",
            Sign::Ne => "!=",
            Sign::Lt => "<",
            Sign::Le => "<=",
            Sign::Gt => ">",
            Sign::Ge => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Sign::Eq | Sign::Ne)
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterExpression {
    pub column: String,
    pub sign: Sign,
    pub value: FilterValue,
}

impl FilterExpression {
    /// Matches everything; translating it would only add joins.
    pub fn is_wildcard(&self) -> bool {
        matches!(&self.value, FilterValue::Scalar(value) if value == "*")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Vec<Filter>),
    Expression(FilterExpression),
}

impl Filter {
    pub fn expression(column: &str, sign: Sign, value: &str) -> Self {
        Filter::Expression(FilterExpression {
            column: column.to_string(),
            sign,
            value: FilterValue::Scalar(value.to_string()),
        })
    }

    pub fn list(column: &str, sign: Sign, values: &[&str]) -> Self {
        Filter::Expression(FilterExpression {
            column: column.to_string(),
            sign,
            value: FilterValue::List(values.iter().map(|v| v.to_string()).collect()),
        })
    }

    pub fn equals(column: &str, value: &str) -> Self {
        Self::expression(column, Sign::Eq, value)
    }

    /// Every column the tree references, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::And(children) | Filter::Or(children) | Filter::Not(children) => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Filter::Expression(expr) => {
                if !out.contains(&expr.column.as_str()) {
                    out.push(&expr.column);
                }
            }
        }
    }
}

/// Right-hand side of a resolved comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A value still to be quoted.
    Literal(String),
    Literals(Vec<String>),
    /// Already valid SQL, such as an epoch number or a datetime literal.
    Sql(String),
    SqlList(Vec<String>),
}

/// A filter tree whose columns have been resolved to SQL expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Vec<Predicate>),
    Compare {
        column: String,
        sign: Sign,
        operand: Operand,
    },
    Raw(String),
}

impl Predicate {
    pub fn render(&self, dialect: Dialect) -> Result<Option<String>> {
        self.render_at(dialect, 0)
    }

    fn render_at(&self, dialect: Dialect, level: usize) -> Result<Option<String>> {
        match self {
            Predicate::All(children) => render_chain(children, " AND ", dialect, level),
            Predicate::Any(children) => render_chain(children, " OR ", dialect, level),
            Predicate::Not(children) => {
                let inner = render_chain(children, " AND ", dialect, 0)?;
                Ok(inner.map(|inner| format!("NOT ({inner})")))
            }
            Predicate::Compare {
                column,
                sign,
                operand,
            } => render_compare(column, *sign, operand, dialect).map(Some),
            Predicate::Raw(sql) => Ok(Some(sql.clone())),
        }
    }
}

fn render_chain(
    children: &[Predicate],
    glue: &str,
    dialect: Dialect,
    level: usize,
) -> Result<Option<String>> {
    let mut parts = Vec::with_capacity(children.len());
    for child in children {
        if let Some(part) = child.render_at(dialect, level + 1)? {
            parts.push(part);
        }
    }

    Ok(match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ if level > 0 => Some(format!("({})", parts.join(glue))),
        _ => Some(parts.join(glue)),
    })
}

fn render_compare(column: &str, sign: Sign, operand: &Operand, dialect: Dialect) -> Result<String> {
    match operand {
        Operand::Literal(value) if sign.is_equality() && value.contains('*') => {
            let keyword = if sign == Sign::Eq { "LIKE" } else { "NOT LIKE" };
            Ok(format!(
                "{column} {keyword} {}",
                dialect.quote(&value.replace('*', "%"))
            ))
        }
        Operand::Literal(value) => Ok(format!("{column} {sign} {}", dialect.quote(value))),
        Operand::Sql(sql) => Ok(format!("{column} {sign} {sql}")),
        Operand::Literals(values) => {
            let quoted: Vec<_> = values.iter().map(|value| dialect.quote(value)).collect();
            render_list(column, sign, &quoted)
        }
        Operand::SqlList(values) => render_list(column, sign, values),
    }
}

fn render_list(column: &str, sign: Sign, values: &[String]) -> Result<String> {
    match sign {
        Sign::Eq if values.is_empty() => Ok("1 = 0".to_string()),
        Sign::Ne if values.is_empty() => Ok("1 = 1".to_string()),
        Sign::Eq => Ok(format!("{column} IN ({})", values.join(", "))),
        Sign::Ne => Ok(format!("{column} NOT IN ({})", values.join(", "))),
        other => Err(QueryError::InvalidFilter(format!(
            "operator {other} cannot compare \"{column}\" against a list"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compare(column: &str, sign: Sign, operand: Operand) -> Predicate {
        Predicate::Compare {
            column: column.to_string(),
            sign,
            operand,
        }
    }

    #[test]
    fn wildcards_become_like() {
        let rendered = compare("ho.name1", Sign::Eq, Operand::Literal("web*".into()))
            .render(Dialect::Mysql)
            .unwrap();
        assert_eq!(rendered.as_deref(), Some("ho.name1 LIKE 'web%'"));

        let rendered = compare("ho.name1", Sign::Ne, Operand::Literal("*db*".into()))
            .render(Dialect::Pgsql)
            .unwrap();
        assert_eq!(rendered.as_deref(), Some("ho.name1 NOT LIKE '%db%'"));
    }

    #[test]
    fn lists_become_in_clauses() {
        let rendered = compare(
            "hs.current_state",
            Sign::Ne,
            Operand::Literals(vec!["1".into(), "2".into()]),
        )
        .render(Dialect::Mysql)
        .unwrap();
        assert_eq!(rendered.as_deref(), Some("hs.current_state NOT IN ('1', '2')"));

        let empty = compare("x", Sign::Eq, Operand::Literals(vec![]))
            .render(Dialect::Mysql)
            .unwrap();
        assert_eq!(empty.as_deref(), Some("1 = 0"));
    }

    #[test]
    fn ordered_list_comparison_is_rejected() {
        let err = compare("x", Sign::Gt, Operand::Literals(vec!["1".into()]))
            .render(Dialect::Mysql)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter(_)));
    }

    #[test]
    fn nested_chains_are_parenthesized() {
        let tree = Predicate::All(vec![
            compare("a", Sign::Eq, Operand::Sql("1".into())),
            Predicate::Any(vec![
                compare("b", Sign::Eq, Operand::Sql("2".into())),
                compare("c", Sign::Gt, Operand::Sql("3".into())),
            ]),
            Predicate::Not(vec![compare("d", Sign::Eq, Operand::Literal("x".into()))]),
        ]);
        assert_eq!(
            tree.render(Dialect::Mysql).unwrap().as_deref(),
            Some("a = 1 AND (b = 2 OR c > 3) AND NOT (d = 'x')")
        );
    }

    #[test]
    fn empty_chains_render_nothing() {
        let tree = Predicate::Any(vec![Predicate::All(vec![]), Predicate::Not(vec![])]);
        assert_eq!(tree.render(Dialect::Mysql).unwrap(), None);
    }

    #[test]
    fn filter_trees_deserialize_from_json() {
        let json = r#"{"and":[
            {"expression":{"column":"host_state","sign":"!=","value":"0"}},
            {"expression":{"column":"host_name","sign":"=","value":["a","b"]}}
        ]}"#;
        let filter: Filter = serde_json::from_str(json).unwrap();
        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::expression("host_state", Sign::Ne, "0"),
                Filter::list("host_name", Sign::Eq, &["a", "b"]),
            ])
        );
        assert_eq!(filter.columns(), vec!["host_state", "host_name"]);
    }

    #[test]
    fn only_a_bare_star_is_a_wildcard() {
        let Filter::Expression(star) = Filter::equals("host_name", "*") else {
            unreachable!()
        };
        let Filter::Expression(prefix) = Filter::equals("host_name", "web*") else {
            unreachable!()
        };
        assert!(star.is_wildcard());
        assert!(!prefix.is_wildcard());
    }
}
