//! Host and service status facades.

use super::{
    columns::{ColumnMap, VirtualTable},
    facade::{Base, Facade, ObjectKind},
    ido::IdoQuery,
    joins,
    sql::JoinKind,
    QueryType,
};
use crate::error::Result;

/// FROM objects ho INNER JOIN hosts h
fn host_base(q: &mut IdoQuery) -> Result<()> {
    q.set_from("objects", "ho");
    let on = format!(
        "h.host_object_id = {} AND ho.is_active = 1 AND ho.objecttype_id = 1",
        q.key("ho", "objects")
    );
    q.join(JoinKind::Inner, "hosts", "h", on);
    Ok(())
}

/// FROM objects so INNER JOIN services s
fn service_base(q: &mut IdoQuery) -> Result<()> {
    q.set_from("objects", "so");
    let on = format!(
        "s.service_object_id = {} AND so.is_active = 1 AND so.objecttype_id = 2",
        q.key("so", "objects")
    );
    q.join(JoinKind::Inner, "services", "s", on);
    Ok(())
}

// service_handled reads both status rows.
fn service_hoststatus(q: &mut IdoQuery) -> Result<()> {
    q.require_virtual_table(VirtualTable::Servicestatus)?;
    joins::hoststatus(q)
}

const HOST_STATE: &str =
    "CASE WHEN hs.has_been_checked = 0 OR hs.has_been_checked IS NULL THEN 99 ELSE hs.current_state END";

const HOST_HARD_STATE: &str = "CASE WHEN hs.has_been_checked = 0 OR hs.has_been_checked IS NULL THEN 99 \
     ELSE CASE WHEN hs.state_type = 1 THEN hs.current_state ELSE hs.last_hard_state END END";

const HOST_PROBLEM: &str = "CASE WHEN COALESCE(hs.current_state, 0) = 0 THEN 0 ELSE 1 END";

const HOST_HANDLED: &str = "CASE WHEN (hs.problem_has_been_acknowledged + hs.scheduled_downtime_depth) > 0 \
     THEN 1 ELSE 0 END";

const HOST_SEVERITY: &str = "CASE WHEN hs.current_state = 0 \
     THEN CASE WHEN hs.has_been_checked = 0 OR hs.has_been_checked IS NULL THEN 16 ELSE 0 END \
     + CASE WHEN hs.problem_has_been_acknowledged = 1 THEN 2 \
     ELSE CASE WHEN hs.scheduled_downtime_depth > 0 THEN 1 ELSE 4 END END \
     ELSE CASE WHEN hs.has_been_checked = 0 OR hs.has_been_checked IS NULL THEN 16 \
     WHEN hs.current_state = 1 THEN 32 WHEN hs.current_state = 2 THEN 64 ELSE 256 END \
     + CASE WHEN hs.problem_has_been_acknowledged = 1 THEN 2 \
     ELSE CASE WHEN hs.scheduled_downtime_depth > 0 THEN 1 ELSE 4 END END END";

const SERVICE_STATE: &str =
    "CASE WHEN ss.has_been_checked = 0 OR ss.has_been_checked IS NULL THEN 99 ELSE ss.current_state END";

const SERVICE_HARD_STATE: &str = "CASE WHEN ss.has_been_checked = 0 OR ss.has_been_checked IS NULL THEN 99 \
     ELSE CASE WHEN ss.state_type = 1 THEN ss.current_state ELSE ss.last_hard_state END END";

const SERVICE_HANDLED: &str = "CASE WHEN (ss.problem_has_been_acknowledged + ss.scheduled_downtime_depth \
     + COALESCE(hs.current_state, 0)) > 0 THEN 1 ELSE 0 END";

const SERVICE_SEVERITY: &str = "CASE WHEN ss.current_state = 0 \
     THEN CASE WHEN ss.has_been_checked = 0 OR ss.has_been_checked IS NULL THEN 16 ELSE 0 END \
     + CASE WHEN ss.problem_has_been_acknowledged = 1 THEN 2 \
     ELSE CASE WHEN ss.scheduled_downtime_depth > 0 THEN 1 ELSE 4 END END \
     ELSE CASE WHEN ss.has_been_checked = 0 OR ss.has_been_checked IS NULL THEN 16 \
     WHEN ss.current_state = 1 THEN 32 WHEN ss.current_state = 2 THEN 128 \
     WHEN ss.current_state = 3 THEN 64 ELSE 256 END \
     + CASE WHEN ss.problem_has_been_acknowledged = 1 THEN 2 \
     ELSE CASE WHEN ss.scheduled_downtime_depth > 0 THEN 1 ELSE 4 END END END";

pub(super) fn hoststatus() -> Facade {
    let columns = ColumnMap::new()
        .table(
            VirtualTable::Hosts,
            &[
                ("host", "ho.name1 COLLATE latin1_general_ci"),
                ("host_name", "ho.name1"),
                ("host_display_name", "h.display_name COLLATE latin1_general_ci"),
                ("host_alias", "h.alias"),
                ("host_address", "h.address"),
                ("host_ipv4", "INET_ATON(h.address)"),
                ("host_icon_image", "h.icon_image"),
                ("host_notes_url", "h.notes_url"),
                ("host_action_url", "h.action_url"),
                ("object_type", "('host')"),
            ],
        )
        .table(
            VirtualTable::Hoststatus,
            &[
                ("host_state", HOST_STATE),
                ("host_hard_state", HOST_HARD_STATE),
                ("host_state_type", "hs.state_type"),
                ("host_output", "hs.output"),
                ("host_long_output", "hs.long_output"),
                ("host_perfdata", "hs.perfdata"),
                ("host_problem", HOST_PROBLEM),
                ("host_acknowledged", "hs.problem_has_been_acknowledged"),
                ("host_in_downtime", "CASE WHEN (hs.scheduled_downtime_depth = 0) THEN 0 ELSE 1 END"),
                ("host_handled", HOST_HANDLED),
                ("host_does_active_checks", "hs.active_checks_enabled"),
                ("host_accepts_passive_checks", "hs.passive_checks_enabled"),
                ("host_active_checks_enabled", "hs.active_checks_enabled"),
                ("host_passive_checks_enabled", "hs.passive_checks_enabled"),
                (
                    "host_is_passive_checked",
                    "CASE WHEN hs.active_checks_enabled = 0 AND hs.passive_checks_enabled = 1 THEN 1 ELSE 0 END",
                ),
                ("host_flap_detection_enabled", "hs.flap_detection_enabled"),
                ("host_is_flapping", "hs.is_flapping"),
                ("host_event_handler_enabled", "hs.event_handler_enabled"),
                ("host_notifications_enabled", "hs.notifications_enabled"),
                ("host_check_command", "hs.check_command"),
                ("host_current_check_attempt", "hs.current_check_attempt"),
                ("host_max_check_attempts", "hs.max_check_attempts"),
                ("host_check_execution_time", "hs.execution_time"),
                ("host_check_latency", "hs.latency"),
                ("host_last_check", "UNIX_TIMESTAMP(hs.last_check)"),
                ("host_next_check", "UNIX_TIMESTAMP(hs.next_check)"),
                ("host_last_state_change", "UNIX_TIMESTAMP(hs.last_state_change)"),
                ("host_last_hard_state", "hs.last_hard_state"),
                ("host_last_hard_state_change", "UNIX_TIMESTAMP(hs.last_hard_state_change)"),
                ("host_last_notification", "UNIX_TIMESTAMP(hs.last_notification)"),
                ("host_last_time_up", "UNIX_TIMESTAMP(hs.last_time_up)"),
                ("host_last_time_down", "UNIX_TIMESTAMP(hs.last_time_down)"),
                ("host_last_time_unreachable", "UNIX_TIMESTAMP(hs.last_time_unreachable)"),
                ("host_percent_state_change", "hs.percent_state_change"),
                ("host_severity", HOST_SEVERITY),
            ],
        )
        .table(
            VirtualTable::Services,
            &[
                ("service", "so.name2 COLLATE latin1_general_ci"),
                ("service_description", "so.name2"),
                ("service_display_name", "s.display_name COLLATE latin1_general_ci"),
            ],
        )
        .table(VirtualTable::Hostgroups, joins::HOSTGROUP_COLUMNS)
        .table(VirtualTable::Servicegroups, joins::SERVICEGROUP_COLUMNS)
        .table(VirtualTable::Instances, &[("instance_name", "i.instance_name")]);

    Facade::new(QueryType::Hoststatus, columns, Base::Join(host_base))
        .object(ObjectKind::Host)
        .base_tables(&[VirtualTable::Hosts])
        .defaults(&[VirtualTable::Hosts, VirtualTable::Hoststatus])
        .join(VirtualTable::Hoststatus, joins::hoststatus)
        .join(VirtualTable::Services, joins::services)
        .join(VirtualTable::Hostgroups, joins::hostgroups)
        .join(VirtualTable::Servicegroups, joins::servicegroups)
        .join(VirtualTable::Instances, joins::instances)
        .group(
            &[("ho", "objects"), ("h", "hosts")],
            &[
                VirtualTable::Services,
                VirtualTable::Hostgroups,
                VirtualTable::Servicegroups,
            ],
        )
        .custom_vars()
}

pub(super) fn servicestatus() -> Facade {
    let columns = ColumnMap::new()
        .table(
            VirtualTable::Services,
            &[
                ("host", "so.name1 COLLATE latin1_general_ci"),
                ("host_name", "so.name1"),
                ("service", "so.name2 COLLATE latin1_general_ci"),
                ("service_description", "so.name2 COLLATE latin1_general_ci"),
                ("service_display_name", "s.display_name COLLATE latin1_general_ci"),
                ("service_host_name", "so.name1"),
                ("service_icon_image", "s.icon_image"),
                ("service_notes_url", "s.notes_url"),
                ("service_action_url", "s.action_url"),
                ("object_type", "('service')"),
            ],
        )
        .table(
            VirtualTable::Servicestatus,
            &[
                ("service_state", SERVICE_STATE),
                ("service_hard_state", SERVICE_HARD_STATE),
                ("service_state_type", "ss.state_type"),
                ("service_output", "ss.output"),
                ("service_long_output", "ss.long_output"),
                ("service_perfdata", "ss.perfdata"),
                (
                    "service_problem",
                    "CASE WHEN COALESCE(ss.current_state, 0) = 0 THEN 0 ELSE 1 END",
                ),
                ("service_acknowledged", "ss.problem_has_been_acknowledged"),
                (
                    "service_in_downtime",
                    "CASE WHEN (ss.scheduled_downtime_depth = 0) THEN 0 ELSE 1 END",
                ),
                ("service_does_active_checks", "ss.active_checks_enabled"),
                ("service_accepts_passive_checks", "ss.passive_checks_enabled"),
                ("service_active_checks_enabled", "ss.active_checks_enabled"),
                ("service_passive_checks_enabled", "ss.passive_checks_enabled"),
                (
                    "service_is_passive_checked",
                    "CASE WHEN ss.active_checks_enabled = 0 AND ss.passive_checks_enabled = 1 THEN 1 ELSE 0 END",
                ),
                ("service_flap_detection_enabled", "ss.flap_detection_enabled"),
                ("service_is_flapping", "ss.is_flapping"),
                ("service_event_handler_enabled", "ss.event_handler_enabled"),
                ("service_notifications_enabled", "ss.notifications_enabled"),
                ("service_check_command", "ss.check_command"),
                ("service_current_check_attempt", "ss.current_check_attempt"),
                ("service_max_check_attempts", "ss.max_check_attempts"),
                ("service_check_execution_time", "ss.execution_time"),
                ("service_check_latency", "ss.latency"),
                ("service_last_check", "UNIX_TIMESTAMP(ss.last_check)"),
                ("service_next_check", "UNIX_TIMESTAMP(ss.next_check)"),
                ("service_last_state_change", "UNIX_TIMESTAMP(ss.last_state_change)"),
                ("service_last_hard_state", "ss.last_hard_state"),
                ("service_last_hard_state_change", "UNIX_TIMESTAMP(ss.last_hard_state_change)"),
                ("service_last_notification", "UNIX_TIMESTAMP(ss.last_notification)"),
                ("service_last_time_ok", "UNIX_TIMESTAMP(ss.last_time_ok)"),
                ("service_last_time_warning", "UNIX_TIMESTAMP(ss.last_time_warning)"),
                ("service_last_time_critical", "UNIX_TIMESTAMP(ss.last_time_critical)"),
                ("service_last_time_unknown", "UNIX_TIMESTAMP(ss.last_time_unknown)"),
                ("service_percent_state_change", "ss.percent_state_change"),
                ("service_severity", SERVICE_SEVERITY),
            ],
        )
        .table(
            VirtualTable::Hosts,
            &[
                ("host_display_name", "h.display_name COLLATE latin1_general_ci"),
                ("host_alias", "h.alias"),
                ("host_address", "h.address"),
                ("host_ipv4", "INET_ATON(h.address)"),
            ],
        )
        .table(
            VirtualTable::Hoststatus,
            &[
                ("host_state", HOST_STATE),
                ("host_hard_state", HOST_HARD_STATE),
                ("host_problem", HOST_PROBLEM),
                ("host_handled", HOST_HANDLED),
                ("host_output", "hs.output"),
                ("service_handled", SERVICE_HANDLED),
            ],
        )
        .table(VirtualTable::Hostgroups, joins::HOSTGROUP_COLUMNS)
        .table(VirtualTable::Servicegroups, joins::SERVICEGROUP_COLUMNS)
        .table(VirtualTable::Instances, &[("instance_name", "i.instance_name")]);

    Facade::new(QueryType::Servicestatus, columns, Base::Join(service_base))
        .object(ObjectKind::Service)
        .base_tables(&[VirtualTable::Services])
        .defaults(&[VirtualTable::Services, VirtualTable::Servicestatus])
        .join(VirtualTable::Servicestatus, joins::servicestatus)
        .join(VirtualTable::Hosts, joins::hosts)
        .join(VirtualTable::Hoststatus, service_hoststatus)
        .join(VirtualTable::Hostgroups, joins::hostgroups)
        .join(VirtualTable::Servicegroups, joins::servicegroups)
        .join(VirtualTable::Instances, joins::instances)
        .group(
            &[("so", "objects"), ("s", "services")],
            &[VirtualTable::Hostgroups, VirtualTable::Servicegroups],
        )
        .custom_vars()
}
