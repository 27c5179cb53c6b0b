use super::{
    columns::{passthrough, ColumnMap, VirtualTable},
    facade::{Base, Facade, UnionMember, UnionPlan},
    history::HISTORY_COLUMNS,
    QueryType,
};

const MEMBERS: [QueryType; 8] = [
    QueryType::Statehistory,
    QueryType::Downtimestarthistory,
    QueryType::Downtimeendhistory,
    QueryType::Commenthistory,
    QueryType::Commentdeletionhistory,
    QueryType::Notificationhistory,
    QueryType::Flappingstarthistory,
    QueryType::Flappingendhistory,
];

/// Every history family merged into one timeline.
pub(super) fn facade() -> Facade {
    let columns =
        ColumnMap::new().table_owned(VirtualTable::Eventhistory, passthrough("eh", HISTORY_COLUMNS));
    let plan = UnionPlan {
        alias: "eh",
        members: MEMBERS
            .iter()
            .map(|query| UnionMember::passthrough(*query, &[]))
            .collect(),
    };

    Facade::new(QueryType::Eventhistory, columns, Base::Union(plan))
        .base_tables(&[VirtualTable::Eventhistory])
}
