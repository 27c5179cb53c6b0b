use idoql::{
    config::AppConfig,
    error::ServiceError,
    query::{
        describe_queries,
        dialect::{ConnectionDescriptor, Dialect},
        translate_request,
        version::SchemaVersion,
        QueryContext, QueryType, TranslateRequest,
    },
};
use pretty_assertions::assert_eq;

fn setup(dialect: Dialect, version: Option<SchemaVersion>) -> (AppConfig, QueryContext) {
    let config = AppConfig::embedded(ConnectionDescriptor::new(dialect, "icinga_"));
    let ctx = QueryContext::fixed(config.connection.clone(), version);
    (config, ctx)
}

fn request(json: &str) -> TranslateRequest {
    serde_json::from_str(json).expect("valid request json")
}

#[test]
fn host_status_selects_only_what_it_needs() {
    let (config, ctx) = setup(Dialect::Mysql, Some(SchemaVersion::new(1, 14, 3)));
    let response = translate_request(
        &ctx,
        &config,
        request(r#"{"query": "hoststatus", "columns": ["host_name", "host_state"]}"#),
    )
    .expect("translates");

    assert_eq!(response.columns, vec!["host_name", "host_state"]);
    let sql = &response.sql;
    assert!(sql.contains("ho.name1 AS `host_name`"), "sql: {sql}");
    assert!(sql.contains("CASE WHEN hs.has_been_checked = 0"), "sql: {sql}");
    assert!(sql.contains("FROM icinga_objects ho"), "sql: {sql}");
    assert!(sql.contains("INNER JOIN icinga_hoststatus hs"), "sql: {sql}");
    assert!(!sql.contains("hostgroup"), "no hostgroup join: {sql}");
    assert!(!sql.contains("icinga_services"), "no service join: {sql}");
    assert!(!sql.contains("GROUP BY"), "sql: {sql}");
}

#[test]
fn event_history_merges_every_family() {
    let (config, ctx) = setup(Dialect::Mysql, Some(SchemaVersion::new(1, 14, 3)));
    let response = translate_request(&ctx, &config, request(r#"{"query": "eventhistory"}"#))
        .expect("translates");

    assert_eq!(response.columns.len(), 10);
    let sql = &response.sql;
    assert_eq!(sql.matches(" UNION ALL ").count(), 15, "two leaves per family: {sql}");
    for table in [
        "icinga_statehistory",
        "icinga_downtimehistory",
        "icinga_commenthistory",
        "icinga_notifications",
        "icinga_flappinghistory",
    ] {
        assert!(sql.contains(table), "missing {table}: {sql}");
    }
}

#[test]
fn group_filter_on_host_status_groups_rows() {
    let (config, ctx) = setup(Dialect::Pgsql, Some(SchemaVersion::new(1, 14, 3)));
    let response = translate_request(
        &ctx,
        &config,
        request(r#"{"query": "hoststatus", "columns": ["host_name"], "filter": "hostgroup_name=linux"}"#),
    )
    .expect("translates");

    let sql = &response.sql;
    assert!(sql.contains("icinga_hostgroup_members hgm"), "sql: {sql}");
    assert!(sql.contains("GROUP BY"), "pgsql groups on group joins: {sql}");
    assert!(sql.ends_with("LIMIT 100"), "sql: {sql}");
}

#[test]
fn oracle_pages_with_fetch_next() {
    let (config, ctx) = setup(Dialect::Oracle, None);
    let response = translate_request(
        &ctx,
        &config,
        request(r#"{"query": "servicestatus", "columns": ["service_description"], "limit": 25, "offset": 50}"#),
    )
    .expect("translates");

    assert!(
        response.sql.ends_with("OFFSET 50 ROWS FETCH NEXT 25 ROWS ONLY"),
        "sql: {}",
        response.sql
    );
}

#[test]
fn comment_names_depend_on_the_schema_version() {
    let body = r#"{"query": "hostcomment", "columns": ["comment_name"]}"#;

    let (config, legacy) = setup(Dialect::Mysql, Some(SchemaVersion::new(1, 13, 0)));
    let old = translate_request(&legacy, &config, request(body)).expect("translates");
    assert!(old.sql.contains("(NULL) AS `comment_name`"), "sql: {}", old.sql);

    let (config, current) = setup(Dialect::Mysql, Some(SchemaVersion::new(1, 14, 0)));
    let new = translate_request(&current, &config, request(body)).expect("translates");
    assert!(!new.sql.contains("(NULL)"), "sql: {}", new.sql);
}

#[test]
fn custom_variables_are_rejected_on_unions() {
    let (config, ctx) = setup(Dialect::Mysql, None);
    let err = translate_request(
        &ctx,
        &config,
        request(r#"{"query": "comment", "columns": ["comment_author", "_host_location"]}"#),
    )
    .expect_err("union parents select no custom vars");
    assert!(matches!(err, ServiceError::Query(_)), "got: {err:?}");
}

#[test]
fn every_query_type_translates_with_defaults() {
    for dialect in [Dialect::Mysql, Dialect::Pgsql, Dialect::Oracle] {
        let (config, ctx) = setup(dialect, Some(SchemaVersion::new(1, 14, 3)));
        for query in QueryType::ALL {
            let req = TranslateRequest {
                query: query.to_string(),
                ..TranslateRequest::default()
            };
            let response = translate_request(&ctx, &config, req)
                .unwrap_or_else(|err| panic!("{query} on {dialect}: {err}"));
            assert!(!response.columns.is_empty(), "{query} on {dialect}");
            assert!(response.sql.starts_with("SELECT "), "{query} on {dialect}");
        }
    }
}

#[test]
fn descriptions_cover_every_query_type() {
    let (_, ctx) = setup(Dialect::Pgsql, None);
    let described = describe_queries(&ctx).expect("describes");
    assert_eq!(described.len(), QueryType::ALL.len());
    for entry in &described {
        for column in &entry.default_columns {
            assert!(
                entry.columns.contains(column),
                "{} default {column} is selectable",
                entry.query
            );
        }
    }
}

#[test]
fn out_of_range_time_values_are_caller_errors() {
    let (config, ctx) = setup(Dialect::Mysql, Some(SchemaVersion::new(1, 14, 3)));
    for body in [
        r#"{"query": "statehistory", "filter": "timestamp>-9999999999999999 days"}"#,
        r#"{"query": "hoststatus", "filter": "host_last_check<-9999999999999999+weeks"}"#,
    ] {
        let err = translate_request(&ctx, &config, request(body)).expect_err(body);
        match err {
            ServiceError::Query(query_err) => {
                assert!(query_err.is_caller_error(), "{body}: {query_err}")
            }
            other => panic!("{body}: unexpected {other:?}"),
        }
    }
}

#[test]
fn deeply_nested_filters_are_caller_errors() {
    let (config, ctx) = setup(Dialect::Pgsql, None);
    let filter = format!("{}host_name=a", "!".repeat(10_000));
    let req = TranslateRequest {
        query: "hoststatus".to_string(),
        filter: Some(idoql::query::FilterInput::Text(filter)),
        ..TranslateRequest::default()
    };
    let err = translate_request(&ctx, &config, req).expect_err("too deep");
    assert!(matches!(err, ServiceError::Query(ref e) if e.is_caller_error()), "got: {err:?}");
}
