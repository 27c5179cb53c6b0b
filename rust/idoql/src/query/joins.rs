//! Join procedures shared by the facades, keyed on the kind of object a facade
//! is anchored on, plus the column declarations that go with them.

use super::{
    columns::{ColumnMap, VirtualTable},
    facade::{Base, Facade, ObjectKind},
    ido::IdoQuery,
    sql::JoinKind,
    QueryType,
};
use crate::error::{QueryError, Result};

const HOSTGROUP_OBJECT: u8 = 3;
const SERVICEGROUP_OBJECT: u8 = 4;
const CONTACT_OBJECT: u8 = 10;

/// `<alias>.<pk> = <foreign> AND <alias>.is_active = 1 AND <alias>.objecttype_id = <n>`
fn active_object(q: &IdoQuery, alias: &str, foreign: &str, objecttype: u8) -> String {
    format!(
        "{} = {foreign} AND {alias}.is_active = 1 AND {alias}.objecttype_id = {objecttype}",
        q.key(alias, "objects")
    )
}

fn object_key(q: &IdoQuery) -> Result<String> {
    let kind = q.object_kind()?;
    Ok(q.key(kind.object_alias(), "objects"))
}

/// FROM the facade's source table, joined to its active host or service object.
pub fn source_base(q: &mut IdoQuery) -> Result<()> {
    let facade = q.facade();
    let kind = q.object_kind()?;
    let source = facade.source.as_ref().ok_or_else(|| QueryError::MissingJoin {
        query: facade.query.as_str().to_string(),
        table: "source".to_string(),
    })?;

    let alias = kind.object_alias();
    q.set_from(source.table, source.alias);
    let on = active_object(
        q,
        alias,
        &format!("{}.object_id", source.alias),
        kind.objecttype_id(),
    );
    q.join(JoinKind::Inner, "objects", alias, on);
    for predicate in &source.predicates {
        q.where_raw(predicate);
    }
    Ok(())
}

pub fn hosts(q: &mut IdoQuery) -> Result<()> {
    let on = match q.object_kind()? {
        ObjectKind::Host => format!("h.host_object_id = {}", object_key(q)?),
        ObjectKind::Service => {
            q.require_virtual_table(VirtualTable::Services)?;
            "h.host_object_id = s.host_object_id".to_string()
        }
    };
    q.join(JoinKind::Inner, "hosts", "h", on);
    Ok(())
}

pub fn hoststatus(q: &mut IdoQuery) -> Result<()> {
    match q.object_kind()? {
        ObjectKind::Host => {
            let on = format!("hs.host_object_id = {}", object_key(q)?);
            q.join(JoinKind::Inner, "hoststatus", "hs", on);
        }
        ObjectKind::Service => {
            q.require_virtual_table(VirtualTable::Services)?;
            q.join(
                JoinKind::Left,
                "hoststatus",
                "hs",
                "hs.host_object_id = s.host_object_id".to_string(),
            );
        }
    }
    Ok(())
}

pub fn services(q: &mut IdoQuery) -> Result<()> {
    match q.object_kind()? {
        ObjectKind::Host => {
            let on = format!("s.host_object_id = {}", object_key(q)?);
            q.join(JoinKind::Left, "services", "s", on);
            let on = active_object(q, "so", "s.service_object_id", ObjectKind::Service.objecttype_id());
            q.join(JoinKind::Left, "objects", "so", on);
        }
        ObjectKind::Service => {
            let on = format!("s.service_object_id = {}", object_key(q)?);
            q.join(JoinKind::Inner, "services", "s", on);
        }
    }
    Ok(())
}

pub fn servicestatus(q: &mut IdoQuery) -> Result<()> {
    match q.object_kind()? {
        ObjectKind::Host => {
            q.require_virtual_table(VirtualTable::Services)?;
            q.join(
                JoinKind::Left,
                "servicestatus",
                "ss",
                "ss.service_object_id = s.service_object_id".to_string(),
            );
        }
        ObjectKind::Service => {
            let on = format!("ss.service_object_id = {}", object_key(q)?);
            q.join(JoinKind::Inner, "servicestatus", "ss", on);
        }
    }
    Ok(())
}

pub fn hostgroups(q: &mut IdoQuery) -> Result<()> {
    let on = match q.object_kind()? {
        ObjectKind::Host => format!("hgm.host_object_id = {}", object_key(q)?),
        ObjectKind::Service => {
            q.require_virtual_table(VirtualTable::Services)?;
            "hgm.host_object_id = s.host_object_id".to_string()
        }
    };
    q.join(JoinKind::Left, "hostgroup_members", "hgm", on);
    let on = format!("{} = hgm.hostgroup_id", q.key("hg", "hostgroups"));
    q.join(JoinKind::Left, "hostgroups", "hg", on);
    let on = active_object(q, "hgo", "hg.hostgroup_object_id", HOSTGROUP_OBJECT);
    q.join(JoinKind::Left, "objects", "hgo", on);
    Ok(())
}

pub fn servicegroups(q: &mut IdoQuery) -> Result<()> {
    let on = match q.object_kind()? {
        ObjectKind::Host => {
            q.require_virtual_table(VirtualTable::Services)?;
            "sgm.service_object_id = s.service_object_id".to_string()
        }
        ObjectKind::Service => format!("sgm.service_object_id = {}", object_key(q)?),
    };
    q.join(JoinKind::Left, "servicegroup_members", "sgm", on);
    let on = format!("{} = sgm.servicegroup_id", q.key("sg", "servicegroups"));
    q.join(JoinKind::Left, "servicegroups", "sg", on);
    let on = active_object(q, "sgo", "sg.servicegroup_object_id", SERVICEGROUP_OBJECT);
    q.join(JoinKind::Left, "objects", "sgo", on);
    Ok(())
}

pub fn instances(q: &mut IdoQuery) -> Result<()> {
    let anchor = q.object_kind()?.object_alias();
    q.join(
        JoinKind::Inner,
        "instances",
        "i",
        format!("i.instance_id = {anchor}.instance_id"),
    );
    Ok(())
}

/// Contacts a notification went out to.
pub fn contactnotifications(q: &mut IdoQuery) -> Result<()> {
    q.join(
        JoinKind::Left,
        "contactnotifications",
        "cn",
        "cn.notification_id = hn.notification_id".to_string(),
    );
    let on = active_object(q, "co", "cn.contact_object_id", CONTACT_OBJECT);
    q.join(JoinKind::Left, "objects", "co", on);
    Ok(())
}

pub fn via_contactnotifications(q: &mut IdoQuery) -> Result<()> {
    q.require_virtual_table(VirtualTable::Contactnotifications)
}

/// A facade selecting from a source table anchored on `kind` objects.
///
/// `own` lands in the `base` virtual table ahead of the object identity
/// columns; the usual object tables are declared and registered lazily.
pub fn object_facade(
    query: QueryType,
    kind: ObjectKind,
    base: VirtualTable,
    own: &[(&str, &str)],
) -> Facade {
    let identity: &[(&str, &str)] = match kind {
        ObjectKind::Host => &[
            ("host", "ho.name1 COLLATE latin1_general_ci"),
            ("host_name", "ho.name1"),
            ("object_type", "('host')"),
        ],
        ObjectKind::Service => &[
            ("host", "so.name1 COLLATE latin1_general_ci"),
            ("host_name", "so.name1"),
            ("service", "so.name2 COLLATE latin1_general_ci"),
            ("service_description", "so.name2"),
            ("service_host_name", "so.name1"),
            ("object_type", "('service')"),
        ],
    };
    let service_columns: &[(&str, &str)] = match kind {
        ObjectKind::Host => &[
            ("service", "so.name2 COLLATE latin1_general_ci"),
            ("service_description", "so.name2"),
            ("service_display_name", "s.display_name COLLATE latin1_general_ci"),
            ("service_host_name", "so.name1"),
        ],
        ObjectKind::Service => &[(
            "service_display_name",
            "s.display_name COLLATE latin1_general_ci",
        )],
    };

    let columns = ColumnMap::new()
        .table(base, own)
        .table(base, identity)
        .table(
            VirtualTable::Hosts,
            &[
                ("host_alias", "h.alias"),
                ("host_display_name", "h.display_name COLLATE latin1_general_ci"),
            ],
        )
        .table(VirtualTable::Services, service_columns)
        .table(
            VirtualTable::Hoststatus,
            &[(
                "host_state",
                "CASE WHEN hs.has_been_checked = 0 OR hs.has_been_checked IS NULL THEN 99 ELSE hs.current_state END",
            )],
        )
        .table(VirtualTable::Hostgroups, HOSTGROUP_COLUMNS)
        .table(VirtualTable::Servicegroups, SERVICEGROUP_COLUMNS)
        .table(VirtualTable::Instances, &[("instance_name", "i.instance_name")]);

    let origin = match kind {
        ObjectKind::Host => VirtualTable::Services,
        ObjectKind::Service => VirtualTable::Servicegroups,
    };

    Facade::new(query, columns, Base::Join(source_base))
        .object(kind)
        .base_tables(&[base])
        .defaults(&[base])
        .join(VirtualTable::Hosts, hosts)
        .join(VirtualTable::Services, services)
        .join(VirtualTable::Hoststatus, hoststatus)
        .join(VirtualTable::Hostgroups, hostgroups)
        .join(VirtualTable::Servicegroups, servicegroups)
        .join(VirtualTable::Instances, instances)
        .group(&[], &[VirtualTable::Hostgroups, origin])
        .custom_vars()
}

pub const HOSTGROUP_COLUMNS: &[(&str, &str)] = &[
    ("hostgroup", "hgo.name1 COLLATE latin1_general_ci"),
    ("hostgroup_alias", "hg.alias COLLATE latin1_general_ci"),
    ("hostgroup_name", "hgo.name1"),
];

pub const SERVICEGROUP_COLUMNS: &[(&str, &str)] = &[
    ("servicegroup", "sgo.name1 COLLATE latin1_general_ci"),
    ("servicegroup_alias", "sg.alias COLLATE latin1_general_ci"),
    ("servicegroup_name", "sgo.name1"),
];
