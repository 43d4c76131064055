use dealsync_core::{IdentifierMap, SourceRecord};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingUpdate<'a> {
    pub record: &'a SourceRecord,
    pub row_id: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition<'a> {
    pub updates: Vec<PendingUpdate<'a>>,
    pub creates: Vec<&'a SourceRecord>,
}

/// Stable split of the deals into rows to update and rows to create.
pub fn partition<'a>(records: &'a [SourceRecord], map: &'a IdentifierMap) -> Partition<'a> {
    let mut out = Partition::default();
    for record in records {
        match map.get(&record.id) {
            Some(row_id) => out.updates.push(PendingUpdate { record, row_id }),
            None => out.creates.push(record),
        }
    }
    out
}
