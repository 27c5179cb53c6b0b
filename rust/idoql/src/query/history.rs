//! Event history facades: one leaf per history family and object kind, plus a
//! host/service union per family.

use super::{
    columns::{passthrough, ColumnMap, VirtualTable},
    facade::{Base, Comparison, EnumValue, Facade, ObjectKind, UnionMember, UnionPlan},
    joins, QueryContext, QueryType,
};
use crate::error::Result;

/// Columns every history union exposes, in select order.
pub(super) const HISTORY_COLUMNS: &[&str] = &[
    "timestamp",
    "object_id",
    "type",
    "output",
    "state",
    "object_type",
    "host_name",
    "service_description",
    "host_display_name",
    "service_display_name",
];

const HOST_PLACEHOLDERS: &[&str] = &["service_description", "service_display_name"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    State,
    DowntimeStart,
    DowntimeEnd,
    Comment,
    CommentDeletion,
    Notification,
    FlappingStart,
    FlappingEnd,
}

impl Family {
    /// Only meaningful for history query types.
    fn of(query: QueryType) -> Family {
        use QueryType::*;
        match query {
            Hoststatehistory | Servicestatehistory | Statehistory => Family::State,
            Hostdowntimestarthistory | Servicedowntimestarthistory | Downtimestarthistory => {
                Family::DowntimeStart
            }
            Hostdowntimeendhistory | Servicedowntimeendhistory | Downtimeendhistory => {
                Family::DowntimeEnd
            }
            Hostcommenthistory | Servicecommenthistory | Commenthistory => Family::Comment,
            Hostcommentdeletionhistory | Servicecommentdeletionhistory | Commentdeletionhistory => {
                Family::CommentDeletion
            }
            Hostnotification | Servicenotification | Notificationhistory => Family::Notification,
            Hostflappingstarthistory | Serviceflappingstarthistory | Flappingstarthistory => {
                Family::FlappingStart
            }
            Hostflappingendhistory | Serviceflappingendhistory | Flappingendhistory => {
                Family::FlappingEnd
            }
            _ => Family::State,
        }
    }

    fn table(self) -> VirtualTable {
        match self {
            Family::State => VirtualTable::Statehistory,
            Family::DowntimeStart | Family::DowntimeEnd => VirtualTable::Downtimehistory,
            Family::Comment | Family::CommentDeletion => VirtualTable::Commenthistory,
            Family::Notification => VirtualTable::Notifications,
            Family::FlappingStart | Family::FlappingEnd => VirtualTable::Flappinghistory,
        }
    }

    /// `(physical table, alias)`
    fn source(self) -> (&'static str, &'static str) {
        match self {
            Family::State => ("statehistory", "hh"),
            Family::DowntimeStart | Family::DowntimeEnd => ("downtimehistory", "hdh"),
            Family::Comment | Family::CommentDeletion => ("commenthistory", "hch"),
            Family::Notification => ("notifications", "hn"),
            Family::FlappingStart | Family::FlappingEnd => ("flappinghistory", "hfh"),
        }
    }

    fn predicates(self) -> &'static [&'static str] {
        match self {
            Family::DowntimeStart => &["hdh.actual_start_time > '1970-01-02 00:00:00'"],
            Family::DowntimeEnd => &["hdh.actual_end_time > '1970-01-02 00:00:00'"],
            Family::CommentDeletion => &["hch.deletion_time > '1970-01-02 00:00:00'"],
            Family::FlappingStart => &["hfh.event_type = 1000"],
            Family::FlappingEnd => &["hfh.event_type = 1001"],
            Family::State | Family::Comment | Family::Notification => &[],
        }
    }

    /// Raw datetime column behind `timestamp`.
    fn time_column(self) -> &'static str {
        match self {
            Family::State => "hh.state_time",
            Family::DowntimeStart => "hdh.actual_start_time",
            Family::DowntimeEnd => "hdh.actual_end_time",
            Family::Comment => "hch.comment_time",
            Family::CommentDeletion => "hch.deletion_time",
            Family::Notification => "hn.start_time",
            Family::FlappingStart | Family::FlappingEnd => "hfh.event_time",
        }
    }

    fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Family::State => STATE_COLUMNS,
            Family::DowntimeStart => DOWNTIME_START_COLUMNS,
            Family::DowntimeEnd => DOWNTIME_END_COLUMNS,
            Family::Comment => COMMENT_COLUMNS,
            Family::CommentDeletion => COMMENT_DELETION_COLUMNS,
            Family::Notification => NOTIFICATION_COLUMNS,
            Family::FlappingStart => FLAPPING_START_COLUMNS,
            Family::FlappingEnd => FLAPPING_END_COLUMNS,
        }
    }

    fn types(self) -> Option<&'static [EnumValue]> {
        match self {
            Family::State => Some(STATE_TYPES),
            Family::Comment => Some(COMMENT_TYPES),
            Family::CommentDeletion => Some(COMMENT_DELETION_TYPES),
            _ => None,
        }
    }

    fn union_alias(self) -> &'static str {
        match self {
            Family::State => "sth",
            Family::DowntimeStart | Family::DowntimeEnd => "dth",
            Family::Comment | Family::CommentDeletion => "ch",
            Family::Notification => "nh",
            Family::FlappingStart | Family::FlappingEnd => "fh",
        }
    }

    /// Host member first.
    fn members(self) -> [QueryType; 2] {
        use QueryType::*;
        match self {
            Family::State => [Hoststatehistory, Servicestatehistory],
            Family::DowntimeStart => [Hostdowntimestarthistory, Servicedowntimestarthistory],
            Family::DowntimeEnd => [Hostdowntimeendhistory, Servicedowntimeendhistory],
            Family::Comment => [Hostcommenthistory, Servicecommenthistory],
            Family::CommentDeletion => [Hostcommentdeletionhistory, Servicecommentdeletionhistory],
            Family::Notification => [Hostnotification, Servicenotification],
            Family::FlappingStart => [Hostflappingstarthistory, Serviceflappingstarthistory],
            Family::FlappingEnd => [Hostflappingendhistory, Serviceflappingendhistory],
        }
    }
}

const STATE_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "UNIX_TIMESTAMP(hh.state_time)"),
    ("object_id", "hh.object_id"),
    (
        "type",
        "(CASE WHEN hh.state_type = 1 THEN 'hard_state' ELSE 'soft_state' END)",
    ),
    (
        "output",
        "('[ ' || hh.current_check_attempt || '/' || hh.max_check_attempts || ' ] ' || hh.output)",
    ),
    ("state", "hh.state"),
    ("attempt", "hh.current_check_attempt"),
    ("max_attempts", "hh.max_check_attempts"),
];

const DOWNTIME_START_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "UNIX_TIMESTAMP(hdh.actual_start_time)"),
    ("object_id", "hdh.object_id"),
    ("type", "('dt_start')"),
    ("output", "('[' || hdh.author_name || '] ' || hdh.comment_data)"),
    ("state", "(-1)"),
];

const DOWNTIME_END_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "UNIX_TIMESTAMP(hdh.actual_end_time)"),
    ("object_id", "hdh.object_id"),
    ("type", "('dt_end')"),
    ("output", "('[' || hdh.author_name || '] ' || hdh.comment_data)"),
    ("state", "(-1)"),
];

const COMMENT_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "UNIX_TIMESTAMP(hch.comment_time)"),
    ("object_id", "hch.object_id"),
    (
        "type",
        "(CASE hch.entry_type WHEN 1 THEN 'comment' WHEN 2 THEN 'dt_comment' WHEN 3 THEN 'flapping' WHEN 4 THEN 'ack' END)",
    ),
    ("output", "('[' || hch.author_name || '] ' || hch.comment_data)"),
    ("state", "(-1)"),
];

const COMMENT_DELETION_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "UNIX_TIMESTAMP(hch.deletion_time)"),
    ("object_id", "hch.object_id"),
    (
        "type",
        "(CASE hch.entry_type WHEN 1 THEN 'comment_deleted' WHEN 2 THEN 'dt_comment_deleted' \
         WHEN 3 THEN 'flapping_deleted' WHEN 4 THEN 'ack_deleted' END)",
    ),
    ("output", "('[' || hch.author_name || '] ' || hch.comment_data)"),
    ("state", "(-1)"),
];

// output lives in the history table, it lists the notified contacts.
const NOTIFICATION_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "UNIX_TIMESTAMP(hn.start_time)"),
    ("object_id", "hn.object_id"),
    ("type", "('notify')"),
    ("state", "hn.state"),
    ("notification_reason", "hn.notification_reason"),
];

const FLAPPING_START_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "UNIX_TIMESTAMP(hfh.event_time)"),
    ("object_id", "hfh.object_id"),
    ("type", "('flapping')"),
    ("output", "(hfh.percent_state_change || '')"),
    ("state", "(-1)"),
];

const FLAPPING_END_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "UNIX_TIMESTAMP(hfh.event_time)"),
    ("object_id", "hfh.object_id"),
    ("type", "('flapping_deleted')"),
    ("output", "(hfh.percent_state_change || '')"),
    ("state", "(-1)"),
];

const STATE_TYPES: &[EnumValue] = &[
    EnumValue {
        literal: "hard_state",
        eq: "hh.state_type = 1",
        ne: "(hh.state_type <> 1 OR hh.state_type IS NULL)",
    },
    EnumValue {
        literal: "soft_state",
        eq: "(hh.state_type <> 1 OR hh.state_type IS NULL)",
        ne: "hh.state_type = 1",
    },
];

const COMMENT_TYPES: &[EnumValue] = &[
    EnumValue {
        literal: "comment",
        eq: "hch.entry_type = 1",
        ne: "hch.entry_type IN (2, 3, 4)",
    },
    EnumValue {
        literal: "dt_comment",
        eq: "hch.entry_type = 2",
        ne: "hch.entry_type IN (1, 3, 4)",
    },
    EnumValue {
        literal: "flapping",
        eq: "hch.entry_type = 3",
        ne: "hch.entry_type IN (1, 2, 4)",
    },
    EnumValue {
        literal: "ack",
        eq: "hch.entry_type = 4",
        ne: "hch.entry_type IN (1, 2, 3)",
    },
];

const COMMENT_DELETION_TYPES: &[EnumValue] = &[
    EnumValue {
        literal: "comment_deleted",
        eq: "hch.entry_type = 1",
        ne: "hch.entry_type IN (2, 3, 4)",
    },
    EnumValue {
        literal: "dt_comment_deleted",
        eq: "hch.entry_type = 2",
        ne: "hch.entry_type IN (1, 3, 4)",
    },
    EnumValue {
        literal: "flapping_deleted",
        eq: "hch.entry_type = 3",
        ne: "hch.entry_type IN (1, 2, 4)",
    },
    EnumValue {
        literal: "ack_deleted",
        eq: "hch.entry_type = 4",
        ne: "hch.entry_type IN (1, 2, 3)",
    },
];

fn notification_output(ctx: &QueryContext) -> Result<Vec<(&'static str, String)>> {
    let contacts = ctx.dialect().string_list("co.name1");
    Ok(vec![(
        "output",
        format!("('[' || {contacts} || '] ' || hn.output)"),
    )])
}

fn kind_of(query: QueryType) -> ObjectKind {
    if query.as_str().starts_with("service") {
        ObjectKind::Service
    } else {
        ObjectKind::Host
    }
}

pub(super) fn leaf(query: QueryType) -> Facade {
    let family = Family::of(query);
    let kind = kind_of(query);
    let (table, alias) = family.source();

    let mut facade = joins::object_facade(query, kind, family.table(), family.columns())
        .source(table, alias, family.predicates())
        .group(&[(alias, table), (kind.object_alias(), "objects")], &[])
        .comparison(Comparison::RawTimestamp {
            alias: "timestamp",
            column: family.time_column(),
        });

    if let Some(values) = family.types() {
        facade = facade.comparison(Comparison::Enumerated {
            alias: "type",
            values,
        });
    }

    if family == Family::Notification {
        facade = facade
            .table(VirtualTable::History, &[("output", "hn.output")])
            .table(
                VirtualTable::Contactnotifications,
                &[("notification_contact_name", "co.name1")],
            )
            .join(VirtualTable::History, joins::via_contactnotifications)
            .join(VirtualTable::Contactnotifications, joins::contactnotifications)
            .group(&[], &[VirtualTable::Contactnotifications])
            .overrides(notification_output);
    }

    facade
}

pub(super) fn union(query: QueryType) -> Facade {
    let family = Family::of(query);
    let alias = family.union_alias();
    let [host, service] = family.members();

    let columns = ColumnMap::new().table_owned(family.table(), passthrough(alias, HISTORY_COLUMNS));
    let plan = UnionPlan {
        alias,
        members: vec![
            UnionMember::passthrough(host, HOST_PLACEHOLDERS),
            UnionMember::passthrough(service, &[]),
        ],
    };

    Facade::new(query, columns, Base::Union(plan)).base_tables(&[family.table()])
}
