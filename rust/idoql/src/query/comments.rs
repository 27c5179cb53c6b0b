use super::{
    columns::{passthrough, ColumnMap, VirtualTable},
    facade::{Base, Comparison, EnumValue, Facade, ObjectKind, UnionMember, UnionPlan},
    joins, QueryContext, QueryType,
};
use crate::error::Result;

const COMMENT_COLUMNS: &[(&str, &str)] = &[
    ("comment_author", "c.author_name COLLATE latin1_general_ci"),
    ("comment_author_name", "c.author_name"),
    ("comment_data", "c.comment_data"),
    (
        "comment_expiration",
        "CASE c.expires WHEN 1 THEN UNIX_TIMESTAMP(c.expiration_time) ELSE NULL END",
    ),
    ("comment_internal_id", "c.internal_comment_id"),
    ("comment_is_persistent", "c.is_persistent"),
    ("comment_name", "c.name"),
    ("comment_timestamp", "UNIX_TIMESTAMP(c.comment_time)"),
    (
        "comment_type",
        "CASE c.entry_type WHEN 1 THEN 'comment' WHEN 2 THEN 'downtime' WHEN 3 THEN 'flapping' WHEN 4 THEN 'ack' END",
    ),
];

const COMMENT_TYPES: &[EnumValue] = &[
    EnumValue {
        literal: "comment",
        eq: "c.entry_type = 1",
        ne: "c.entry_type IN (2, 3, 4)",
    },
    EnumValue {
        literal: "downtime",
        eq: "c.entry_type = 2",
        ne: "c.entry_type IN (1, 3, 4)",
    },
    EnumValue {
        literal: "flapping",
        eq: "c.entry_type = 3",
        ne: "c.entry_type IN (1, 2, 4)",
    },
    EnumValue {
        literal: "ack",
        eq: "c.entry_type = 4",
        ne: "c.entry_type IN (1, 2, 3)",
    },
];

/// Aliases the comment union exposes.
const UNION_COLUMNS: &[&str] = &[
    "comment_author",
    "comment_author_name",
    "comment_data",
    "comment_expiration",
    "comment_internal_id",
    "comment_is_persistent",
    "comment_name",
    "comment_timestamp",
    "comment_type",
    "host",
    "host_name",
    "host_display_name",
    "object_type",
    "service",
    "service_description",
    "service_display_name",
];

/// Comment names exist since schema 1.14.0.
fn comment_name(ctx: &QueryContext) -> Result<Vec<(&'static str, String)>> {
    if ctx.schema_version()?.at_least(1, 14, 0) {
        return Ok(Vec::new());
    }
    Ok(vec![("comment_name", "(NULL)".to_string())])
}

pub(super) fn leaf(query: QueryType) -> Facade {
    let kind = match query {
        QueryType::Servicecomment => ObjectKind::Service,
        _ => ObjectKind::Host,
    };

    joins::object_facade(query, kind, VirtualTable::Comments, COMMENT_COLUMNS)
        .source("comments", "c", &[])
        .group(&[("c", "comments"), (kind.object_alias(), "objects")], &[])
        .overrides(comment_name)
        .comparison(Comparison::RawTimestamp {
            alias: "comment_timestamp",
            column: "c.comment_time",
        })
        .comparison(Comparison::Enumerated {
            alias: "comment_type",
            values: COMMENT_TYPES,
        })
}

pub(super) fn union() -> Facade {
    let columns = ColumnMap::new().table_owned(VirtualTable::Comments, passthrough("c", UNION_COLUMNS));
    let plan = UnionPlan {
        alias: "c",
        members: vec![
            UnionMember::passthrough(
                QueryType::Hostcomment,
                &["service", "service_description", "service_display_name"],
            ),
            UnionMember::passthrough(QueryType::Servicecomment, &[]),
        ],
    };

    Facade::new(QueryType::Comment, columns, Base::Union(plan)).base_tables(&[VirtualTable::Comments])
}
