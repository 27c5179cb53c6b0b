use super::{
    columns::{passthrough, ColumnMap, VirtualTable},
    facade::{Base, Comparison, Facade, ObjectKind, UnionMember, UnionPlan},
    joins, QueryContext, QueryType,
};
use crate::error::Result;

const DOWNTIME_COLUMNS: &[(&str, &str)] = &[
    ("downtime_author", "sd.author_name COLLATE latin1_general_ci"),
    ("downtime_author_name", "sd.author_name"),
    ("downtime_comment", "sd.comment_data"),
    ("downtime_duration", "sd.duration"),
    ("downtime_end", "UNIX_TIMESTAMP(sd.scheduled_end_time)"),
    ("downtime_entry_time", "UNIX_TIMESTAMP(sd.entry_time)"),
    ("downtime_internal_id", "sd.internal_downtime_id"),
    ("downtime_is_fixed", "sd.is_fixed"),
    ("downtime_is_flexible", "CASE WHEN sd.is_fixed = 0 THEN 1 ELSE 0 END"),
    ("downtime_is_in_effect", "sd.is_in_effect"),
    ("downtime_name", "sd.name"),
    ("downtime_scheduled_end", "UNIX_TIMESTAMP(sd.scheduled_end_time)"),
    ("downtime_scheduled_start", "UNIX_TIMESTAMP(sd.scheduled_start_time)"),
    (
        "downtime_start",
        "UNIX_TIMESTAMP(CASE WHEN UNIX_TIMESTAMP(sd.trigger_time) > 0 THEN sd.trigger_time ELSE sd.scheduled_start_time END)",
    ),
    ("downtime_triggered_by_id", "sd.triggered_by_id"),
];

const UNION_COLUMNS: &[&str] = &[
    "downtime_author",
    "downtime_author_name",
    "downtime_comment",
    "downtime_duration",
    "downtime_end",
    "downtime_entry_time",
    "downtime_internal_id",
    "downtime_is_fixed",
    "downtime_is_flexible",
    "downtime_is_in_effect",
    "downtime_name",
    "downtime_scheduled_end",
    "downtime_scheduled_start",
    "downtime_start",
    "downtime_triggered_by_id",
    "host",
    "host_name",
    "host_display_name",
    "object_type",
    "service",
    "service_description",
    "service_display_name",
];

fn downtime_name(ctx: &QueryContext) -> Result<Vec<(&'static str, String)>> {
    if ctx.schema_version()?.at_least(1, 14, 0) {
        return Ok(Vec::new());
    }
    Ok(vec![("downtime_name", "(NULL)".to_string())])
}

pub(super) fn leaf(query: QueryType) -> Facade {
    let kind = match query {
        QueryType::Servicedowntime => ObjectKind::Service,
        _ => ObjectKind::Host,
    };

    joins::object_facade(query, kind, VirtualTable::Downtimes, DOWNTIME_COLUMNS)
        .source("scheduleddowntime", "sd", &[])
        .group(&[("sd", "scheduleddowntime"), (kind.object_alias(), "objects")], &[])
        .overrides(downtime_name)
        .comparison(Comparison::RawTimestamp {
            alias: "downtime_entry_time",
            column: "sd.entry_time",
        })
        .comparison(Comparison::RawTimestamp {
            alias: "downtime_scheduled_start",
            column: "sd.scheduled_start_time",
        })
        .comparison(Comparison::RawTimestamp {
            alias: "downtime_scheduled_end",
            column: "sd.scheduled_end_time",
        })
}

pub(super) fn union() -> Facade {
    let columns =
        ColumnMap::new().table_owned(VirtualTable::Downtimes, passthrough("d", UNION_COLUMNS));
    let plan = UnionPlan {
        alias: "d",
        members: vec![
            UnionMember::passthrough(
                QueryType::Hostdowntime,
                &["service", "service_description", "service_display_name"],
            ),
            UnionMember::passthrough(QueryType::Servicedowntime, &[]),
        ],
    };

    Facade::new(QueryType::Downtime, columns, Base::Union(plan))
        .base_tables(&[VirtualTable::Downtimes])
}
