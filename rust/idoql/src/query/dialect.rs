//! SQL dialect handling: literal quoting, primary key naming and the column map
//! normalizer that rewrites MySQL-flavoured expressions for PostgreSQL and Oracle.

use super::{
    columns::{ColumnMap, VirtualTable},
    version::SchemaVersion,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    Pgsql,
    Oracle,
}

/// Tables whose primary key column is plain `id` in the Oracle IDO schema.
const ORACLE_ID_TABLES: &[&str] = &[
    "objects",
    "hosts",
    "services",
    "hostgroups",
    "servicegroups",
    "contacts",
    "contactgroups",
];

/// Timestamps before this instant are reported as 0 on PostgreSQL.
const EPOCH_FLOOR: &str = "'1970-01-03 00:00:00+00'::timestamp with time zone";

const UTC_NOW_SINCE: SchemaVersion = SchemaVersion::new(1, 14, 2);

impl Dialect {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Some(Dialect::Mysql),
            "pgsql" | "postgres" | "postgresql" => Some(Dialect::Pgsql),
            "oracle" | "oci" => Some(Dialect::Oracle),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Pgsql => "pgsql",
            Dialect::Oracle => "oracle",
        }
    }

    /// Quotes a string literal.
    pub fn quote(self, value: &str) -> String {
        match self {
            Dialect::Mysql => {
                let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
                format!("'{escaped}'")
            }
            Dialect::Pgsql | Dialect::Oracle => format!("'{}'", value.replace('\'', "''")),
        }
    }

    /// Quotes an output column alias.
    ///
    /// Oracle folds unquoted identifiers to upper case, so aliases are quoted
    /// upper case there and stay reachable from unquoted references.
    pub fn quote_identifier(self, ident: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Pgsql => format!("\"{}\"", ident.replace('"', "\"\"")),
            Dialect::Oracle => format!("\"{}\"", ident.to_uppercase().replace('"', "\"\"")),
        }
    }

    pub fn primary_key(self, table: &str) -> String {
        if self == Dialect::Oracle && ORACLE_ID_TABLES.contains(&table) {
            return "id".to_string();
        }

        let stem = match table.strip_suffix('s') {
            Some(stem) if !table.ends_with("status") => stem,
            _ => table,
        };
        format!("{stem}_id")
    }

    /// Join condition of a custom variable table instance.
    pub fn customvar_condition(self, object_column: &str, join_alias: &str, name: &str) -> String {
        let name = self.quote(name);
        match self {
            Dialect::Mysql => format!(
                "{object_column} = {join_alias}.object_id AND {join_alias}.varname = {name} COLLATE latin1_general_ci"
            ),
            Dialect::Pgsql | Dialect::Oracle => format!(
                "{object_column} = {join_alias}.object_id AND LOWER({join_alias}.varname) = {name}"
            ),
        }
    }

    /// Converts epoch seconds to a datetime in the session time zone, the one
    /// raw IDO datetime columns are stored and compared in.
    pub fn epoch_datetime(self, seconds: i64) -> String {
        match self {
            Dialect::Mysql => format!("FROM_UNIXTIME({seconds})"),
            Dialect::Pgsql => format!("TO_TIMESTAMP({seconds})"),
            Dialect::Oracle => format!("unixts2localts({seconds})"),
        }
    }

    pub fn limit_clause(self, limit: u64, offset: u64) -> String {
        match self {
            Dialect::Mysql | Dialect::Pgsql if offset == 0 => format!("LIMIT {limit}"),
            Dialect::Mysql | Dialect::Pgsql => format!("LIMIT {limit} OFFSET {offset}"),
            Dialect::Oracle => format!("OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY"),
        }
    }

    /// Comma separated, de-duplicated list of `column` values within a group.
    pub fn string_list(self, column: &str) -> String {
        match self {
            Dialect::Mysql => format!(
                "GROUP_CONCAT(DISTINCT {column} ORDER BY {column} SEPARATOR ', ') COLLATE latin1_general_ci"
            ),
            Dialect::Pgsql => format!("ARRAY_TO_STRING(ARRAY_AGG(DISTINCT {column}), ', ')"),
            Dialect::Oracle => format!("LISTAGG({column}, ', ') WITHIN GROUP (ORDER BY {column})"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the query layer needs to know about the backing connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub dialect: Dialect,
    pub table_prefix: String,
    pub host: String,
    pub dbname: String,
}

impl ConnectionDescriptor {
    pub fn new(dialect: Dialect, table_prefix: impl Into<String>) -> Self {
        Self {
            dialect,
            table_prefix: table_prefix.into(),
            host: "localhost".to_string(),
            dbname: "icinga".to_string(),
        }
    }

    pub fn with_identity(mut self, host: impl Into<String>, dbname: impl Into<String>) -> Self {
        self.host = host.into();
        self.dbname = dbname.into();
        self
    }

    pub fn table(&self, name: &str) -> String {
        format!("{}{}", self.table_prefix, name)
    }

    /// Identity used to memoize per-connection facts such as the schema version.
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.host, self.dbname)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedColumn {
    pub alias: String,
    pub expr: String,
    /// The declared expression goes through `UNIX_TIMESTAMP`.
    pub timestamp: bool,
    /// The declared expression carried a collation.
    pub collated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTable {
    pub table: VirtualTable,
    pub columns: Vec<NormalizedColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedColumnMap {
    tables: Vec<NormalizedTable>,
}

impl NormalizedColumnMap {
    pub fn tables(&self) -> &[NormalizedTable] {
        &self.tables
    }

    pub fn expression(&self, alias: &str) -> Option<&str> {
        self.tables
            .iter()
            .flat_map(|table| table.columns.iter())
            .find(|column| column.alias == alias)
            .map(|column| column.expr.as_str())
    }
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static COLLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+COLLATE\s+[A-Za-z0-9_]+").expect("valid regex"));
static INET_ATON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)inet_aton\(([\w.]+)\)").expect("valid regex"));
static UNIX_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bunix_timestamp\b").expect("valid regex"));

/// Rewrites a column map for `dialect`.
///
/// `version` is the backing schema version; PostgreSQL needs it to decide how
/// `NOW()` is interpreted. The input map is never modified.
pub fn normalize(
    map: &ColumnMap,
    dialect: Dialect,
    version: Option<&SchemaVersion>,
) -> NormalizedColumnMap {
    let tables = map
        .tables()
        .map(|table| NormalizedTable {
            table: table.table,
            columns: table
                .columns
                .iter()
                .map(|(alias, expr)| normalize_column(alias, expr, dialect, version))
                .collect(),
        })
        .collect();

    NormalizedColumnMap { tables }
}

fn normalize_column(
    alias: &str,
    raw: &str,
    dialect: Dialect,
    version: Option<&SchemaVersion>,
) -> NormalizedColumn {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
    let timestamp = UNIX_TIMESTAMP.is_match(&collapsed);
    let collated = COLLATE.is_match(&collapsed);

    let expr = match dialect {
        Dialect::Mysql => collapsed,
        Dialect::Oracle => {
            let stripped = COLLATE.replace_all(&collapsed, "");
            UNIX_TIMESTAMP
                .replace_all(&stripped, "localts2unixts")
                .into_owned()
        }
        Dialect::Pgsql => {
            let stripped = COLLATE.replace_all(&collapsed, "");
            let inet = INET_ATON.replace_all(
                &stripped,
                r"(CASE WHEN ${1} ~ '(?:[0-9]{1,3}\.){3}[0-9]{1,3}' THEN ${1}::inet - '0.0.0.0' ELSE NULL END)",
            );
            let guarded = guard_unix_timestamps(&inet);
            if version.is_some_and(|version| *version >= UTC_NOW_SINCE) {
                guarded.replace("NOW()", "NOW() AT TIME ZONE 'UTC'")
            } else {
                guarded
            }
        }
    };

    NormalizedColumn {
        alias: alias.to_string(),
        expr,
        timestamp,
        collated: collated && dialect != Dialect::Oracle,
    }
}

/// Wraps every top level `UNIX_TIMESTAMP(..)` call so timestamps before the
/// epoch floor yield 0. Nested parentheses inside the argument are honored.
fn guard_unix_timestamps(expr: &str) -> String {
    const NEEDLE: &str = "unix_timestamp(";

    let lower = expr.to_ascii_lowercase();
    let bytes = expr.as_bytes();
    let mut out = String::with_capacity(expr.len() + 96);
    let mut cursor = 0;

    while let Some(found) = lower[cursor..].find(NEEDLE) {
        let start = cursor + found;
        let open = start + NEEDLE.len() - 1;

        if start > 0 && is_identifier_byte(bytes[start - 1]) {
            out.push_str(&expr[cursor..=open]);
            cursor = open + 1;
            continue;
        }

        let Some(close) = matching_paren(bytes, open) else {
            break;
        };

        let argument = &expr[open + 1..close];
        out.push_str(&expr[cursor..start]);
        out.push_str(&format!(
            "CASE WHEN ({argument} < {EPOCH_FLOOR}) THEN 0 ELSE UNIX_TIMESTAMP({argument}) END"
        ));
        cursor = close + 1;
    }

    out.push_str(&expr[cursor..]);
    out
}

fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;

    for (offset, &byte) in bytes[open..].iter().enumerate() {
        match byte {
            b'\'' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }

    None
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
