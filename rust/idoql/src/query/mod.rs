pub mod columns;
mod comments;
pub mod dialect;
mod downtimes;
mod eventhistory;
pub mod facade;
pub mod filter;
mod history;
pub mod ido;
mod joins;
pub mod sql;
mod status;
mod summary;
pub mod version;

use crate::{
    config::AppConfig,
    error::{Result, ServiceError, ServiceResult},
    parser,
};
use chrono::{DateTime, Utc};
use columns::ColumnSpec;
use dialect::{ConnectionDescriptor, Dialect};
use facade::Facade;
use filter::Filter;
use ido::IdoQuery;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sql::Direction;
use std::{fmt, str::FromStr, sync::Arc};
use tracing::info;
use version::{FixedVersion, SchemaVersion, SchemaVersionCache, VersionSource};

/// Every query type the engine can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Hoststatus,
    Servicestatus,
    Hostcomment,
    Servicecomment,
    Comment,
    Hostdowntime,
    Servicedowntime,
    Downtime,
    Hoststatehistory,
    Servicestatehistory,
    Hostdowntimestarthistory,
    Servicedowntimestarthistory,
    Hostdowntimeendhistory,
    Servicedowntimeendhistory,
    Hostcommenthistory,
    Servicecommenthistory,
    Hostcommentdeletionhistory,
    Servicecommentdeletionhistory,
    Hostnotification,
    Servicenotification,
    Hostflappingstarthistory,
    Serviceflappingstarthistory,
    Hostflappingendhistory,
    Serviceflappingendhistory,
    Statehistory,
    Downtimestarthistory,
    Downtimeendhistory,
    Commenthistory,
    Commentdeletionhistory,
    Notificationhistory,
    Flappingstarthistory,
    Flappingendhistory,
    Eventhistory,
    Statussummary,
    Hostgroupsummary,
}

impl QueryType {
    /// All query types in declaration order.
    pub const ALL: [QueryType; 35] = [
        QueryType::Hoststatus,
        QueryType::Servicestatus,
        QueryType::Hostcomment,
        QueryType::Servicecomment,
        QueryType::Comment,
        QueryType::Hostdowntime,
        QueryType::Servicedowntime,
        QueryType::Downtime,
        QueryType::Hoststatehistory,
        QueryType::Servicestatehistory,
        QueryType::Hostdowntimestarthistory,
        QueryType::Servicedowntimestarthistory,
        QueryType::Hostdowntimeendhistory,
        QueryType::Servicedowntimeendhistory,
        QueryType::Hostcommenthistory,
        QueryType::Servicecommenthistory,
        QueryType::Hostcommentdeletionhistory,
        QueryType::Servicecommentdeletionhistory,
        QueryType::Hostnotification,
        QueryType::Servicenotification,
        QueryType::Hostflappingstarthistory,
        QueryType::Serviceflappingstarthistory,
        QueryType::Hostflappingendhistory,
        QueryType::Serviceflappingendhistory,
        QueryType::Statehistory,
        QueryType::Downtimestarthistory,
        QueryType::Downtimeendhistory,
        QueryType::Commenthistory,
        QueryType::Commentdeletionhistory,
        QueryType::Notificationhistory,
        QueryType::Flappingstarthistory,
        QueryType::Flappingendhistory,
        QueryType::Eventhistory,
        QueryType::Statussummary,
        QueryType::Hostgroupsummary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::Hoststatus => "hoststatus",
            QueryType::Servicestatus => "servicestatus",
            QueryType::Hostcomment => "hostcomment",
            QueryType::Servicecomment => "servicecomment",
            QueryType::Comment => "comment",
            QueryType::Hostdowntime => "hostdowntime",
            QueryType::Servicedowntime => "servicedowntime",
            QueryType::Downtime => "downtime",
            QueryType::Hoststatehistory => "hoststatehistory",
            QueryType::Servicestatehistory => "servicestatehistory",
            QueryType::Hostdowntimestarthistory => "hostdowntimestarthistory",
            QueryType::Servicedowntimestarthistory => "servicedowntimestarthistory",
            QueryType::Hostdowntimeendhistory => "hostdowntimeendhistory",
            QueryType::Servicedowntimeendhistory => "servicedowntimeendhistory",
            QueryType::Hostcommenthistory => "hostcommenthistory",
            QueryType::Servicecommenthistory => "servicecommenthistory",
            QueryType::Hostcommentdeletionhistory => "hostcommentdeletionhistory",
            QueryType::Servicecommentdeletionhistory => "servicecommentdeletionhistory",
            QueryType::Hostnotification => "hostnotification",
            QueryType::Servicenotification => "servicenotification",
            QueryType::Hostflappingstarthistory => "hostflappingstarthistory",
            QueryType::Serviceflappingstarthistory => "serviceflappingstarthistory",
            QueryType::Hostflappingendhistory => "hostflappingendhistory",
            QueryType::Serviceflappingendhistory => "serviceflappingendhistory",
            QueryType::Statehistory => "statehistory",
            QueryType::Downtimestarthistory => "downtimestarthistory",
            QueryType::Downtimeendhistory => "downtimeendhistory",
            QueryType::Commenthistory => "commenthistory",
            QueryType::Commentdeletionhistory => "commentdeletionhistory",
            QueryType::Notificationhistory => "notificationhistory",
            QueryType::Flappingstarthistory => "flappingstarthistory",
            QueryType::Flappingendhistory => "flappingendhistory",
            QueryType::Eventhistory => "eventhistory",
            QueryType::Statussummary => "statussummary",
            QueryType::Hostgroupsummary => "hostgroupsummary",
        }
    }

    /// The statically registered definition of this query type.
    pub fn facade(self) -> &'static Facade {
        &FACADES[self as usize]
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = ServiceError;

    fn from_str(raw: &str) -> ServiceResult<Self> {
        let wanted = raw.trim().to_ascii_lowercase();
        QueryType::ALL
            .into_iter()
            .find(|query| query.as_str() == wanted)
            .ok_or_else(|| ServiceError::InvalidRequest(format!("unsupported query type: {raw}")))
    }
}

static FACADES: Lazy<Vec<Facade>> = Lazy::new(|| QueryType::ALL.into_iter().map(build).collect());

fn build(query: QueryType) -> Facade {
    use QueryType::*;

    match query {
        Hoststatus => status::hoststatus(),
        Servicestatus => status::servicestatus(),
        Hostcomment | Servicecomment => comments::leaf(query),
        Comment => comments::union(),
        Hostdowntime | Servicedowntime => downtimes::leaf(query),
        Downtime => downtimes::union(),
        Hoststatehistory
        | Servicestatehistory
        | Hostdowntimestarthistory
        | Servicedowntimestarthistory
        | Hostdowntimeendhistory
        | Servicedowntimeendhistory
        | Hostcommenthistory
        | Servicecommenthistory
        | Hostcommentdeletionhistory
        | Servicecommentdeletionhistory
        | Hostnotification
        | Servicenotification
        | Hostflappingstarthistory
        | Serviceflappingstarthistory
        | Hostflappingendhistory
        | Serviceflappingendhistory => history::leaf(query),
        Statehistory
        | Downtimestarthistory
        | Downtimeendhistory
        | Commenthistory
        | Commentdeletionhistory
        | Notificationhistory
        | Flappingstarthistory
        | Flappingendhistory => history::union(query),
        Eventhistory => eventhistory::facade(),
        Statussummary => summary::statussummary(),
        Hostgroupsummary => summary::hostgroupsummary(),
    }
}

/// Checks every registered facade's join registry.
pub fn validate_facades() -> Result<()> {
    for query in QueryType::ALL {
        query.facade().validate()?;
    }
    info!(facades = QueryType::ALL.len(), "query facades validated");
    Ok(())
}

/// Everything a query needs from its surroundings.
#[derive(Clone)]
pub struct QueryContext {
    pub connection: ConnectionDescriptor,
    pub versions: Arc<SchemaVersionCache>,
    pub source: Arc<dyn VersionSource>,
    /// Instant relative filter values are evaluated against.
    pub now: DateTime<Utc>,
}

impl QueryContext {
    pub fn new(
        connection: ConnectionDescriptor,
        versions: Arc<SchemaVersionCache>,
        source: Arc<dyn VersionSource>,
    ) -> Self {
        Self {
            connection,
            versions,
            source,
            now: Utc::now(),
        }
    }

    /// A context with a private cache answering `version` (or the floor).
    pub fn fixed(connection: ConnectionDescriptor, version: Option<SchemaVersion>) -> Self {
        Self::new(
            connection,
            Arc::new(SchemaVersionCache::new()),
            Arc::new(FixedVersion(version)),
        )
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.connection.dialect
    }

    pub fn schema_version(&self) -> Result<SchemaVersion> {
        self.versions
            .get_or_fetch(&self.connection, self.source.as_ref())
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    config: Arc<AppConfig>,
    versions: Arc<SchemaVersionCache>,
    source: Arc<dyn VersionSource>,
}

impl QueryEngine {
    pub fn new(
        config: Arc<AppConfig>,
        versions: Arc<SchemaVersionCache>,
        source: Arc<dyn VersionSource>,
    ) -> Self {
        Self {
            config,
            versions,
            source,
        }
    }

    /// An engine answering the configured schema version.
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let source = Arc::new(FixedVersion(config.schema_version));
        Self::new(config, Arc::new(SchemaVersionCache::new()), source)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn versions(&self) -> &SchemaVersionCache {
        &self.versions
    }

    pub fn context(&self) -> QueryContext {
        QueryContext::new(
            self.config.connection.clone(),
            Arc::clone(&self.versions),
            Arc::clone(&self.source),
        )
    }

    pub async fn translate(&self, request: TranslateRequest) -> ServiceResult<TranslateResponse> {
        translate_request(&self.context(), self.config(), request)
    }

    pub async fn describe(&self) -> ServiceResult<Vec<QueryDescription>> {
        Ok(describe_queries(&self.context())?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDescription {
    pub query: QueryType,
    pub columns: Vec<String>,
    pub default_columns: Vec<String>,
    pub allows_custom_vars: bool,
}

/// Lists what every query type can select.
pub fn describe_queries(ctx: &QueryContext) -> Result<Vec<QueryDescription>> {
    QueryType::ALL
        .into_iter()
        .map(|query| {
            let built = IdoQuery::new(ctx, query, Some(Vec::new()))?;
            Ok(QueryDescription {
                query,
                columns: built.aliases().into_iter().map(str::to_string).collect(),
                default_columns: built.default_columns(),
                allows_custom_vars: built.allows_custom_vars(),
            })
        })
        .collect()
}

/// A filter given either in the URL syntax or as a JSON tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterInput {
    Text(String),
    Tree(Filter),
}

impl FilterInput {
    fn resolve(&self) -> Result<Option<Filter>> {
        match self {
            FilterInput::Text(raw) => parser::parse_filter(raw),
            FilterInput::Tree(tree) => Ok(Some(tree.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub query: String,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub filter: Option<FilterInput>,
    #[serde(default)]
    pub order: Vec<OrderBy>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub distinct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateResponse {
    pub query: QueryType,
    pub dialect: Dialect,
    pub columns: Vec<String>,
    pub sql: String,
    pub count_sql: String,
    pub allows_custom_vars: bool,
}

/// Builds the statement `request` describes without executing it.
pub fn translate_request(
    ctx: &QueryContext,
    config: &AppConfig,
    request: TranslateRequest,
) -> ServiceResult<TranslateResponse> {
    let query_type: QueryType = request.query.parse()?;

    let columns = request
        .columns
        .map(|columns| columns.into_iter().map(ColumnSpec::from).collect());
    let mut query = IdoQuery::new(ctx, query_type, columns)?;

    let filter = request
        .filter
        .as_ref()
        .map(FilterInput::resolve)
        .transpose()?
        .flatten();
    if let Some(filter) = filter {
        query.add_filter(&filter)?;
    }

    for order in &request.order {
        query.order(&order.column, order.direction)?;
    }

    if request.distinct {
        query.distinct();
    }

    let count_sql = query.count_statement()?;
    let limit = determine_limit(config, request.limit);
    query.limit(limit, request.offset.unwrap_or(0));

    Ok(TranslateResponse {
        query: query_type,
        dialect: ctx.dialect(),
        columns: query.output_aliases().into_iter().map(str::to_string).collect(),
        sql: query.to_sql()?,
        count_sql,
        allows_custom_vars: query.allows_custom_vars(),
    })
}

fn determine_limit(config: &AppConfig, candidate: Option<u64>) -> u64 {
    candidate
        .unwrap_or(config.default_limit)
        .clamp(1, config.max_limit.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(dialect: Dialect) -> AppConfig {
        AppConfig::embedded(ConnectionDescriptor::new(dialect, "icinga_"))
    }

    fn ctx(config: &AppConfig) -> QueryContext {
        QueryContext::fixed(config.connection.clone(), Some(SchemaVersion::new(1, 14, 3)))
    }

    #[test]
    fn query_type_names_round_trip() {
        for query in QueryType::ALL {
            assert_eq!(query.as_str().parse::<QueryType>().unwrap(), query);
            assert_eq!(query.facade().query, query, "registry order for {query}");
        }
        assert!("HostStatus".parse::<QueryType>().is_ok());
        assert!("hosts".parse::<QueryType>().is_err());
    }

    #[test]
    fn registry_validates() {
        validate_facades().expect("every facade registers its joins");
    }

    #[test]
    fn translate_applies_filter_order_and_window() {
        let config = config(Dialect::Mysql);
        let request = TranslateRequest {
            query: "hoststatus".to_string(),
            columns: Some(vec!["host_name".to_string(), "host_state".to_string()]),
            filter: Some(FilterInput::Text("host_state!=0".to_string())),
            order: vec![OrderBy {
                column: "host_name".to_string(),
                direction: Direction::Desc,
            }],
            limit: Some(5000),
            offset: Some(20),
            distinct: false,
        };

        let response = translate_request(&ctx(&config), &config, request).unwrap();
        assert_eq!(response.columns, vec!["host_name", "host_state"]);
        assert!(response.allows_custom_vars);
        let sql = response.sql.to_lowercase();
        assert!(sql.contains("where case when hs.has_been_checked"), "sql: {sql}");
        assert!(sql.contains("order by ho.name1 desc"), "sql: {sql}");
        assert!(sql.ends_with("limit 1000 offset 20"), "limit is clamped: {sql}");
        assert!(response.count_sql.starts_with("SELECT COUNT(*) AS `count` FROM"));
        assert!(!response.count_sql.to_lowercase().contains("limit"));
    }

    #[test]
    fn describes_every_query_type() {
        let config = config(Dialect::Mysql);
        let described = describe_queries(&ctx(&config)).unwrap();
        assert_eq!(described.len(), QueryType::ALL.len());

        let eventhistory = described
            .iter()
            .find(|entry| entry.query == QueryType::Eventhistory)
            .expect("eventhistory");
        assert_eq!(eventhistory.columns.len(), 10);
        assert!(eventhistory.allows_custom_vars, "every history leaf takes custom vars");

        let hoststatus = &described[0];
        assert!(hoststatus.columns.contains(&"hostgroup_name".to_string()));
        assert!(hoststatus.default_columns.contains(&"host_state".to_string()));
        assert!(hoststatus.allows_custom_vars);
    }

    #[test]
    fn translate_rejects_unknown_query_types() {
        let config = config(Dialect::Mysql);
        let request = TranslateRequest {
            query: "contacts".to_string(),
            ..TranslateRequest::default()
        };
        let err = translate_request(&ctx(&config), &config, request).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }

    #[test]
    fn translate_accepts_json_filter_trees() {
        let config = config(Dialect::Pgsql);
        let request: TranslateRequest = serde_json::from_str(
            r#"{
                "query": "servicestatus",
                "columns": ["service_description"],
                "filter": {"or": [
                    {"expression": {"column": "service_state", "sign": "=", "value": ["1", "2"]}},
                    {"expression": {"column": "service_description", "sign": "=", "value": "HTTP*"}}
                ]}
            }"#,
        )
        .unwrap();

        let response = translate_request(&ctx(&config), &config, request).unwrap();
        assert!(
            response.sql.contains("IN ('1', '2') OR LOWER(so.name2) LIKE 'http%'"),
            "sql: {}",
            response.sql
        );
        assert!(response.sql.ends_with("LIMIT 100"), "default limit: {}", response.sql);
    }
}
