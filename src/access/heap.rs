use anyhow::{anyhow, bail, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use super::expr::Expression;
use super::record::{Record, RecordId, TOMBSTONE_FREE, TOMBSTONE_OCCUPIED};
use super::scan::TableScan;
use super::schema::{Attribute, DataType, Schema};
use crate::storage::buffer::ReplacementStrategy;
use crate::storage::pagefile::PageFile;
use crate::storage::{BufferPool, MemPage, PageNumber, PAGE_SIZE};

/// Number of frames on the buffer pool attached to every table.
const TABLE_POOL_SIZE: usize = 100;

/// Fixed width of an attribute name entry on the metadata page. Byte 14 is
/// a guaranteed NUL, so names are capped at 14 bytes.
const ATTR_NAME_SIZE: usize = 15;

/// Represents errors that the record heap can have.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// The record id points to a free slot or outside the page.
    #[error("no tuple with the given record id")]
    NoTupleWithGivenRid,

    /// Normal end of a scan.
    #[error("scan has no more tuples")]
    NoMoreTuples,

    /// A scan was started without a predicate.
    #[error("scan requires a predicate expression")]
    ScanConditionNotFound,
}

/// An open table: its schema, its counters, and the buffer pool that
/// caches its heap pages.
///
/// The table name doubles as the heap file path. Page 0 of the file holds
/// the metadata (see [serialize_metadata]); pages 1..N hold fixed size
/// record slots laid out contiguously.
#[derive(Debug)]
pub struct Table {
    name: String,
    pub(crate) schema: Schema,
    pub(crate) pool: BufferPool,
    pub(crate) tuple_count: u32,
    pub(crate) first_free_page: PageNumber,
}

impl Table {
    /// Create a new table: materialize the heap file, write the metadata
    /// page, and attach a buffer pool.
    pub fn create(name: &str, schema: &Schema) -> Result<Table> {
        PageFile::create(name)?;
        let mut file = PageFile::open(name)?;

        let mut page = [0u8; PAGE_SIZE];
        serialize_metadata(schema, 0, 1, &mut page)?;
        file.write_page(0, &page)?;

        debug!("created table {}", name);
        let pool = BufferPool::new(file, TABLE_POOL_SIZE, ReplacementStrategy::Lru)?;
        Ok(Table {
            name: name.to_string(),
            schema: schema.clone(),
            pool,
            tuple_count: 0,
            first_free_page: 1,
        })
    }

    /// Open an existing table, rebuilding its schema and counters from the
    /// metadata page.
    pub fn open(name: &str) -> Result<Table> {
        let file = PageFile::open(name)?;
        let mut pool = BufferPool::new(file, TABLE_POOL_SIZE, ReplacementStrategy::Lru)?;

        let page = pool.pin(0)?;
        let metadata = deserialize_metadata(page.borrow().bytes());
        pool.unpin(0)?;
        let (tuple_count, first_free_page, schema) = metadata?;

        debug!("opened table {} with {} tuples", name, tuple_count);
        Ok(Table {
            name: name.to_string(),
            schema,
            pool,
            tuple_count,
            first_free_page,
        })
    }

    /// Close the table, flushing every dirty page through the pool.
    pub fn close(mut self) -> Result<()> {
        self.pool.shutdown()
    }

    /// Remove a table's heap file from disk.
    pub fn destroy(name: &str) -> Result<()> {
        PageFile::destroy(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of live records on the table.
    pub fn num_tuples(&self) -> u32 {
        self.tuple_count
    }

    /// Insert a record into the first free slot, probing forward from the
    /// first-free-page hint. The record's id is set to the slot chosen.
    ///
    /// Only the record's payload is stored; its tombstone byte is ignored
    /// and written as occupied.
    pub fn insert_record(&mut self, record: &mut Record) -> Result<()> {
        let rec_size = self.schema.record_size();
        let mut page_num = self.first_free_page;

        let slot = loop {
            let page = self.pool.pin(page_num)?;
            let free_slot = find_free_slot(page.borrow().bytes(), rec_size);

            match free_slot {
                Some(slot) => {
                    {
                        let mut page = page.borrow_mut();
                        let bytes = page.bytes_mut();
                        let offset = slot * rec_size;
                        bytes[offset] = TOMBSTONE_OCCUPIED;
                        bytes[offset + 1..offset + rec_size].copy_from_slice(record.payload());
                    }
                    self.pool.mark_dirty(page_num)?;
                    self.pool.unpin(page_num)?;
                    break slot;
                }
                None => {
                    // Page full; probe the next one. The pool zero-extends
                    // the file when the page does not exist yet.
                    self.pool.unpin(page_num)?;
                    page_num += 1;
                }
            }
        };

        record.id = Some(RecordId {
            page: page_num,
            slot,
        });
        self.tuple_count += 1;
        if page_num > self.first_free_page {
            self.first_free_page = page_num;
        }
        self.write_counters()
    }

    /// Mark the slot free and update the counters. The freed page becomes
    /// the new first-free-page hint.
    pub fn delete_record(&mut self, rid: RecordId) -> Result<()> {
        let rec_size = self.schema.record_size();

        let page = self.pool.pin(rid.page)?;
        if rid.slot >= PAGE_SIZE / rec_size {
            self.pool.unpin(rid.page)?;
            bail!(Error::NoTupleWithGivenRid);
        }
        page.borrow_mut().bytes_mut()[rid.slot * rec_size] = TOMBSTONE_FREE;
        self.pool.mark_dirty(rid.page)?;
        self.pool.unpin(rid.page)?;

        self.first_free_page = rid.page;
        self.tuple_count = self.tuple_count.saturating_sub(1);
        self.write_counters()
    }

    /// Overwrite the slot the record's id points to with the record's
    /// payload. The slot is force-marked occupied, so updating a deleted
    /// record resurrects it (last writer wins); the tuple count is left
    /// alone either way.
    pub fn update_record(&mut self, record: &Record) -> Result<()> {
        let rid = record
            .id
            .ok_or_else(|| anyhow!("record has no slot assigned"))?;
        let rec_size = self.schema.record_size();

        let page = self.pool.pin(rid.page)?;
        if rid.slot >= PAGE_SIZE / rec_size {
            self.pool.unpin(rid.page)?;
            bail!(Error::NoTupleWithGivenRid);
        }
        {
            let mut page = page.borrow_mut();
            let bytes = page.bytes_mut();
            let offset = rid.slot * rec_size;
            bytes[offset] = TOMBSTONE_OCCUPIED;
            bytes[offset + 1..offset + rec_size].copy_from_slice(record.payload());
        }
        self.pool.mark_dirty(rid.page)?;
        self.pool.unpin(rid.page)
    }

    /// Fetch the record stored at the given id.
    ///
    /// Fails with [Error::NoTupleWithGivenRid] when the slot is free.
    pub fn get_record(&mut self, rid: RecordId) -> Result<Record> {
        let rec_size = self.schema.record_size();

        let page = self.pool.pin(rid.page)?;
        if rid.slot >= PAGE_SIZE / rec_size {
            self.pool.unpin(rid.page)?;
            bail!(Error::NoTupleWithGivenRid);
        }

        let record = {
            let page = page.borrow();
            let bytes = page.bytes();
            let offset = rid.slot * rec_size;
            if bytes[offset] == TOMBSTONE_OCCUPIED {
                Some(Record::from_slot(rid, &bytes[offset..offset + rec_size]))
            } else {
                None
            }
        };
        self.pool.unpin(rid.page)?;

        match record {
            Some(record) => Ok(record),
            None => bail!(Error::NoTupleWithGivenRid),
        }
    }

    /// Start a predicate scan over the table.
    ///
    /// A scan always filters through a predicate; passing `None` fails
    /// with [Error::ScanConditionNotFound].
    pub fn start_scan(&mut self, pred: Option<Expression>) -> Result<TableScan<'_>> {
        TableScan::new(self, pred)
    }

    /// Persist the tuple count and the first-free-page hint back into the
    /// metadata page, leaving the serialized schema intact.
    fn write_counters(&mut self) -> Result<()> {
        let page = self.pool.pin(0)?;
        {
            let mut page = page.borrow_mut();
            let bytes = page.bytes_mut();
            LittleEndian::write_i32(&mut bytes[0..4], self.tuple_count as i32);
            LittleEndian::write_i32(&mut bytes[4..8], self.first_free_page as i32);
        }
        self.pool.mark_dirty(0)?;
        self.pool.unpin(0)
    }
}

/// Find the first free slot on a page, based on the tombstone byte at the
/// start of each slot.
fn find_free_slot(page: &[u8], rec_size: usize) -> Option<usize> {
    let slots = PAGE_SIZE / rec_size;
    (0..slots).find(|slot| page[slot * rec_size] != TOMBSTONE_OCCUPIED)
}

/// Write the metadata page:
/// `[tuple_count: i32][first_free_page: i32][num_attr: i32][key_size: i32]`
/// followed by one `[name: 15 bytes][data_type: i32][type_length: i32]`
/// entry per attribute and `key_size` i32 key attribute positions.
///
/// All integers are little-endian. Attribute names are NUL padded and
/// capped at 14 bytes.
fn serialize_metadata(
    schema: &Schema,
    tuple_count: u32,
    first_free_page: PageNumber,
    page: &mut MemPage,
) -> Result<()> {
    let key_attrs: &[usize] = schema.key_attrs.as_deref().unwrap_or(&[]);
    let size = 16 + schema.attrs.len() * (ATTR_NAME_SIZE + 8) + key_attrs.len() * 4;
    if size > PAGE_SIZE {
        bail!("schema does not fit on the metadata page");
    }

    LittleEndian::write_i32(&mut page[0..4], tuple_count as i32);
    LittleEndian::write_i32(&mut page[4..8], first_free_page as i32);
    LittleEndian::write_i32(&mut page[8..12], schema.attrs.len() as i32);
    LittleEndian::write_i32(&mut page[12..16], key_attrs.len() as i32);

    let mut offset = 16;
    for attr in &schema.attrs {
        for byte in &mut page[offset..offset + ATTR_NAME_SIZE] {
            *byte = 0;
        }
        let name = attr.name.as_bytes();
        let len = name.len().min(ATTR_NAME_SIZE - 1);
        page[offset..offset + len].copy_from_slice(&name[..len]);
        offset += ATTR_NAME_SIZE;

        LittleEndian::write_i32(&mut page[offset..offset + 4], attr.data_type.code());
        offset += 4;
        LittleEndian::write_i32(&mut page[offset..offset + 4], attr.type_length as i32);
        offset += 4;
    }

    for &key in key_attrs {
        LittleEndian::write_i32(&mut page[offset..offset + 4], key as i32);
        offset += 4;
    }
    Ok(())
}

/// Parse the metadata page written by [serialize_metadata].
fn deserialize_metadata(page: &[u8]) -> Result<(u32, PageNumber, Schema)> {
    let tuple_count = LittleEndian::read_i32(&page[0..4]);
    let first_free_page = LittleEndian::read_i32(&page[4..8]);
    let num_attr = LittleEndian::read_i32(&page[8..12]);
    let key_size = LittleEndian::read_i32(&page[12..16]);

    if tuple_count < 0 || first_free_page < 1 || num_attr < 0 || key_size < 0 {
        bail!("table metadata is corrupted");
    }

    let mut offset = 16;
    let mut attrs = Vec::with_capacity(num_attr as usize);
    for _ in 0..num_attr {
        let name_bytes = &page[offset..offset + ATTR_NAME_SIZE];
        let end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(ATTR_NAME_SIZE);
        let name = std::str::from_utf8(&name_bytes[..end])?;
        offset += ATTR_NAME_SIZE;

        let code = LittleEndian::read_i32(&page[offset..offset + 4]);
        offset += 4;
        let data_type = DataType::from_code(code)
            .ok_or_else(|| anyhow!("invalid data type code {} on table metadata", code))?;
        let type_length = LittleEndian::read_i32(&page[offset..offset + 4]);
        offset += 4;

        attrs.push(Attribute::new(name, data_type, type_length.max(0) as usize));
    }

    let schema = if key_size > 0 {
        let mut key_attrs = Vec::with_capacity(key_size as usize);
        for _ in 0..key_size {
            let key = LittleEndian::read_i32(&page[offset..offset + 4]);
            offset += 4;
            key_attrs.push(key.max(0) as usize);
        }
        Schema::with_keys(attrs, key_attrs)
    } else {
        Schema::new(attrs)
    };

    Ok((tuple_count as u32, first_free_page as u32, schema))
}
