use anyhow::{bail, Result};

use super::expr::Expression;
use super::heap::{Error, Table};
use super::record::{Record, RecordId, Value, TOMBSTONE_OCCUPIED};
use crate::storage::{PageNumber, PAGE_SIZE};

/// A predicate scan over a table's heap pages.
///
/// The scan owns an independent cursor and walks the slots in `(page,
/// slot)` order, returning each live record whose predicate evaluates to
/// true. Every step pins its page, copies the slot out, and unpins before
/// evaluating, so no page stays pinned between calls and errors never leak
/// a pin.
///
/// The scan borrows the table for its whole lifetime; dropping it releases
/// the scan state.
#[derive(Debug)]
pub struct TableScan<'a> {
    table: &'a mut Table,
    pred: Expression,

    /// Next slot the cursor will visit.
    next_page: PageNumber,
    next_slot: usize,

    /// First-free-page hint snapshotted when the scan started; the scan
    /// visits pages 1..=last_page + 1.
    last_page: PageNumber,

    rec_size: usize,
    slots_per_page: usize,

    /// Slots stepped so far, bounded to guard against corrupt metadata.
    steps: u64,
    step_limit: u64,
}

impl<'a> TableScan<'a> {
    pub(crate) fn new(table: &'a mut Table, pred: Option<Expression>) -> Result<Self> {
        let pred = match pred {
            Some(pred) => pred,
            None => bail!(Error::ScanConditionNotFound),
        };

        let rec_size = table.schema.record_size();
        let slots_per_page = PAGE_SIZE / rec_size;
        let last_page = table.first_free_page;
        let step_limit = (last_page as u64 + 2) * slots_per_page as u64 + 2;

        Ok(Self {
            table,
            pred,
            next_page: 1,
            next_slot: 0,
            last_page,
            rec_size,
            slots_per_page,
            steps: 0,
            step_limit,
        })
    }

    /// Advance to the next record matching the predicate.
    ///
    /// Fails with [Error::NoMoreTuples] when the cursor has walked past
    /// the last heap page.
    pub fn next(&mut self) -> Result<Record> {
        loop {
            self.steps += 1;
            if self.steps > self.step_limit {
                bail!(Error::NoMoreTuples);
            }

            if self.next_slot >= self.slots_per_page {
                self.next_page += 1;
                self.next_slot = 0;
            }
            if self.next_page > self.last_page + 1 {
                bail!(Error::NoMoreTuples);
            }

            let rid = RecordId {
                page: self.next_page,
                slot: self.next_slot,
            };
            self.next_slot += 1;

            let page = self.table.pool.pin(rid.page)?;
            let record = {
                let page = page.borrow();
                let bytes = page.bytes();
                let offset = rid.slot * self.rec_size;
                if bytes[offset] == TOMBSTONE_OCCUPIED {
                    Some(Record::from_slot(rid, &bytes[offset..offset + self.rec_size]))
                } else {
                    None
                }
            };
            self.table.pool.unpin(rid.page)?;

            let record = match record {
                Some(record) => record,
                None => continue,
            };

            // The predicate must produce a boolean true for a match; any
            // other value is a non-match, not an error.
            match self.pred.eval(&record, &self.table.schema)? {
                Value::Bool(true) => return Ok(record),
                _ => continue,
            }
        }
    }
}
