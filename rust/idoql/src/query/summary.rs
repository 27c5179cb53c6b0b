//! Aggregated state counters over a union of host and service status rows.

use super::{
    columns::{ColumnMap, ColumnSpec, VirtualTable},
    facade::{Base, Facade, UnionMember, UnionPlan},
    QueryType,
};

const ALIAS: &str = "statussummary";

/// `(name, state code, is a problem state)`
const HOST_STATES: &[(&str, u8, bool)] = &[
    ("up", 0, false),
    ("down", 1, true),
    ("unreachable", 2, true),
    ("pending", 99, false),
];

const SERVICE_STATES: &[(&str, u8, bool)] = &[
    ("ok", 0, false),
    ("warning", 1, true),
    ("critical", 2, true),
    ("unknown", 3, true),
    ("pending", 99, false),
];

fn count(object_type: &str, condition: &str) -> String {
    if condition.is_empty() {
        format!("SUM(CASE WHEN object_type = '{object_type}' THEN 1 ELSE 0 END)")
    } else {
        format!("SUM(CASE WHEN object_type = '{object_type}' AND {condition} THEN 1 ELSE 0 END)")
    }
}

fn max(object_type: &str, column: &str) -> String {
    format!("MAX(CASE WHEN object_type = '{object_type}' THEN {column} ELSE 0 END)")
}

/// `<prefix>_total` and one counter per state. `detailed` adds the passive,
/// not checked and problem host breakdowns the status summary reports.
fn state_counters(
    prefix: &str,
    object_type: &str,
    states: &[(&str, u8, bool)],
    detailed: bool,
) -> Vec<(String, String)> {
    let mut out = vec![(format!("{prefix}_total"), count(object_type, ""))];
    let mut push = |name: String, condition: String| out.push((name, count(object_type, &condition)));

    for &(name, code, problem) in states {
        let state = format!("state = {code}");
        push(format!("{prefix}_{name}"), state.clone());
        if problem {
            push(format!("{prefix}_{name}_handled"), format!("{state} AND handled = 1"));
            push(format!("{prefix}_{name}_unhandled"), format!("{state} AND handled = 0"));
        }
        if !detailed {
            continue;
        }
        if problem {
            push(
                format!("{prefix}_{name}_passive"),
                format!("{state} AND is_passive_checked = 1"),
            );
        }
        push(
            format!("{prefix}_{name}_not_checked"),
            format!("{state} AND is_active_checked = 0 AND is_passive_checked = 0"),
        );
        if problem && object_type == "service" {
            push(
                format!("{prefix}_{name}_on_problem_hosts"),
                format!("{state} AND handled = 0 AND host_problem = 1"),
            );
            push(
                format!("{prefix}_{name}_on_ok_hosts"),
                format!("{state} AND host_problem = 0"),
            );
        }
    }
    out
}

fn flag_counters(prefix: &str, object_type: &str) -> Vec<(String, String)> {
    [
        ("active", "is_active_checked = 1"),
        ("passive", "is_passive_checked = 1"),
        ("not_checked", "is_active_checked = 0 AND is_passive_checked = 0"),
        ("flapping", "is_flapping = 1"),
        ("not_triggering_notifications", "is_triggering_notifications = 0"),
        ("not_processing_event_handlers", "is_processing_events = 0"),
        ("without_flap_detection", "is_allowed_to_flap = 0"),
    ]
    .into_iter()
    .map(|(name, condition)| (format!("{prefix}_{name}"), count(object_type, condition)))
    .collect()
}

fn renamed(pairs: &[(&str, Option<&str>)]) -> Vec<ColumnSpec> {
    pairs
        .iter()
        .map(|(alias, source)| match source {
            Some(source) => ColumnSpec::renamed(alias, source),
            None => ColumnSpec::null(alias),
        })
        .collect()
}

pub(super) fn statussummary() -> Facade {
    let mut hosts = state_counters("hosts", "host", HOST_STATES, true);
    hosts.extend(flag_counters("hosts", "host"));
    let mut services = state_counters("services", "service", SERVICE_STATES, true);
    services.extend(flag_counters("services", "service"));

    let columns = ColumnMap::new()
        .table_owned(VirtualTable::Hoststatussummary, hosts)
        .table_owned(VirtualTable::Servicestatussummary, services);

    let host = renamed(&[
        ("handled", Some("host_handled")),
        ("host_problem", Some("host_problem")),
        ("host_state", None),
        ("is_active_checked", Some("host_active_checks_enabled")),
        ("is_allowed_to_flap", Some("host_flap_detection_enabled")),
        ("is_flapping", Some("host_is_flapping")),
        ("is_passive_checked", Some("host_is_passive_checked")),
        ("is_processing_events", Some("host_event_handler_enabled")),
        ("is_triggering_notifications", Some("host_notifications_enabled")),
        ("object_type", Some("object_type")),
        ("severity", Some("host_severity")),
        ("state_change", Some("host_last_state_change")),
        ("state", Some("host_state")),
    ]);
    let service = renamed(&[
        ("handled", Some("service_handled")),
        ("host_problem", Some("host_problem")),
        ("host_state", Some("host_hard_state")),
        ("is_active_checked", Some("service_active_checks_enabled")),
        ("is_allowed_to_flap", Some("service_flap_detection_enabled")),
        ("is_flapping", Some("service_is_flapping")),
        ("is_passive_checked", Some("service_is_passive_checked")),
        ("is_processing_events", Some("service_event_handler_enabled")),
        ("is_triggering_notifications", Some("service_notifications_enabled")),
        ("object_type", Some("object_type")),
        ("severity", Some("service_severity")),
        ("state_change", Some("service_last_state_change")),
        ("state", Some("service_state")),
    ]);

    let plan = UnionPlan {
        alias: ALIAS,
        members: vec![
            UnionMember::fixed(QueryType::Hoststatus, host),
            UnionMember::fixed(QueryType::Servicestatus, service),
        ],
    };

    let tables = [VirtualTable::Hoststatussummary, VirtualTable::Servicestatussummary];
    Facade::new(QueryType::Statussummary, columns, Base::Union(plan))
        .base_tables(&tables)
        .defaults(&tables)
}

pub(super) fn hostgroupsummary() -> Facade {
    let mut hosts = vec![
        (
            "hostgroup".to_string(),
            format!("{ALIAS}.hostgroup_name COLLATE latin1_general_ci"),
        ),
        ("hostgroup_alias".to_string(), format!("{ALIAS}.hostgroup_alias")),
        ("hostgroup_name".to_string(), format!("{ALIAS}.hostgroup_name")),
    ];
    hosts.extend(state_counters("hosts", "host", HOST_STATES, false));
    hosts.push(("hosts_severity".to_string(), max("host", "severity")));
    hosts.push(("hosts_last_state_change".to_string(), max("host", "state_change")));

    let mut services = state_counters("services", "service", SERVICE_STATES, false);
    services.push(("services_severity".to_string(), max("service", "severity")));
    services.push(("services_last_state_change".to_string(), max("service", "state_change")));

    let columns = ColumnMap::new()
        .table_owned(VirtualTable::Hoststatussummary, hosts)
        .table_owned(VirtualTable::Servicestatussummary, services);

    let host = renamed(&[
        ("handled", Some("host_handled")),
        ("host_state", None),
        ("hostgroup_alias", Some("hostgroup_alias")),
        ("hostgroup_name", Some("hostgroup_name")),
        ("object_type", Some("object_type")),
        ("severity", Some("host_severity")),
        ("state", Some("host_state")),
        ("state_change", Some("host_last_state_change")),
    ]);
    let service = renamed(&[
        ("handled", Some("service_handled")),
        ("host_state", Some("host_hard_state")),
        ("hostgroup_alias", Some("hostgroup_alias")),
        ("hostgroup_name", Some("hostgroup_name")),
        ("object_type", Some("object_type")),
        ("severity", Some("service_severity")),
        ("state", Some("service_state")),
        ("state_change", Some("service_last_state_change")),
    ]);

    let plan = UnionPlan {
        alias: ALIAS,
        members: vec![
            UnionMember::fixed(QueryType::Hoststatus, host)
                .restrict(VirtualTable::Hostgroups, "hgo.name1 IS NOT NULL"),
            UnionMember::fixed(QueryType::Servicestatus, service)
                .restrict(VirtualTable::Hostgroups, "hgo.name1 IS NOT NULL"),
        ],
    };

    let tables = [VirtualTable::Hoststatussummary, VirtualTable::Servicestatussummary];
    Facade::new(QueryType::Hostgroupsummary, columns, Base::Union(plan))
        .base_tables(&tables)
        .defaults(&tables)
        .fixed_group(&["statussummary.hostgroup_name", "statussummary.hostgroup_alias"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{
        dialect::{ConnectionDescriptor, Dialect},
        ido::IdoQuery,
        sql::Direction,
        version::SchemaVersion,
        QueryContext,
    };
    use pretty_assertions::assert_eq;

    fn ctx(dialect: Dialect) -> QueryContext {
        QueryContext::fixed(
            ConnectionDescriptor::new(dialect, "icinga_"),
            Some(SchemaVersion::new(1, 14, 3)),
        )
    }

    #[test]
    fn counters_are_generated_per_state() {
        let counters = state_counters("hosts", "host", HOST_STATES, false);
        let names: Vec<&str> = counters.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "hosts_total",
                "hosts_up",
                "hosts_down",
                "hosts_down_handled",
                "hosts_down_unhandled",
                "hosts_unreachable",
                "hosts_unreachable_handled",
                "hosts_unreachable_unhandled",
                "hosts_pending",
            ]
        );
        assert_eq!(
            counters[4].1,
            "SUM(CASE WHEN object_type = 'host' AND state = 1 AND handled = 0 THEN 1 ELSE 0 END)"
        );
    }

    #[test]
    fn status_summary_selects_aggregates_over_both_members() {
        let query = IdoQuery::new(&ctx(Dialect::Mysql), QueryType::Statussummary, None).unwrap();
        assert_eq!(query.members().len(), 2);
        let [host, service] = [&query.members()[0], &query.members()[1]];
        assert_eq!(host.output_aliases(), service.output_aliases());

        let host_sql = host.to_sql().unwrap();
        assert!(host_sql.contains("NULL AS `host_state`"), "sql: {host_sql}");
        assert!(host_sql.contains("('host') AS `object_type`"));

        let service_sql = service.to_sql().unwrap();
        assert!(
            service_sql.contains("ELSE hs.last_hard_state END END AS `host_state`"),
            "sql: {service_sql}"
        );

        let sql = query.to_sql().unwrap();
        assert!(sql.starts_with(
            "SELECT SUM(CASE WHEN object_type = 'host' THEN 1 ELSE 0 END) AS `hosts_total`"
        ));
        assert!(sql.contains(
            "SUM(CASE WHEN object_type = 'service' AND state = 2 AND handled = 0 AND host_problem = 1 THEN 1 ELSE 0 END) \
             AS `services_critical_on_problem_hosts`"
        ));
        assert!(sql.ends_with(") statussummary"), "sql: {sql}");
    }

    #[test]
    fn summary_filters_reach_both_members() {
        let mut query =
            IdoQuery::new(&ctx(Dialect::Mysql), QueryType::Statussummary, None).unwrap();
        query.where_("hostgroup_name", "linux-servers").unwrap();
        for member in query.members() {
            let sql = member.to_sql().unwrap();
            assert!(sql.contains("WHERE hgo.name1 = 'linux-servers'"), "sql: {sql}");
        }
    }

    #[test]
    fn hostgroup_summary_groups_by_group() {
        let mut query = IdoQuery::new(
            &ctx(Dialect::Pgsql),
            QueryType::Hostgroupsummary,
            Some(vec![
                ColumnSpec::from("hostgroup_name"),
                ColumnSpec::from("hosts_down_unhandled"),
                ColumnSpec::from("services_critical_unhandled"),
            ]),
        )
        .unwrap();
        query.order("hostgroup_name", Direction::Asc).unwrap();

        for member in query.members() {
            let sql = member.to_sql().unwrap();
            assert!(sql.contains("hgo.name1 IS NOT NULL"), "sql: {sql}");
            assert!(sql.contains("icinga_hostgroup_members hgm"), "sql: {sql}");
        }

        let sql = query.to_sql().unwrap();
        assert!(
            sql.ends_with(
                "GROUP BY statussummary.hostgroup_name, statussummary.hostgroup_alias \
                 ORDER BY statussummary.hostgroup_name ASC"
            ),
            "sql: {sql}"
        );
    }
}
