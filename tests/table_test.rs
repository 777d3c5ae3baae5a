use anyhow::Result;
use tempfile::TempDir;

use heapdb::access::expr::Expression;
use heapdb::access::heap::{Error, Table};
use heapdb::access::record::{Record, RecordId, Value};
use heapdb::access::schema::{Attribute, DataType, Schema};

fn row_schema() -> Schema {
    Schema::new(vec![
        Attribute::new("a", DataType::Int, 0),
        Attribute::new("b", DataType::String, 4),
    ])
}

fn table_path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).display().to_string()
}

fn insert_rows(table: &mut Table, count: i32) -> Result<Vec<RecordId>> {
    let schema = table.schema().clone();
    let mut rids = Vec::new();
    for i in 0..count {
        let mut record = Record::new(&schema);
        record.set_attr(&schema, 0, &Value::Int(i))?;
        record.set_attr(&schema, 1, &Value::String(format!("row{}", i)))?;
        table.insert_record(&mut record)?;
        rids.push(record.id.expect("insert should assign a record id"));
    }
    Ok(rids)
}

#[test]
fn test_insert_and_get_round_trip() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");
    let schema = row_schema();

    let mut table = Table::create(&path, &schema)?;
    let rids = insert_rows(&mut table, 10)?;
    assert_eq!(10, table.num_tuples());

    for (i, rid) in rids.iter().enumerate() {
        let record = table.get_record(*rid)?;
        assert_eq!(Value::Int(i as i32), record.get_attr(&schema, 0)?);
        assert_eq!(
            Value::String(format!("row{}", i)),
            record.get_attr(&schema, 1)?
        );
    }

    table.close()?;
    Ok(())
}

#[test]
fn test_scan_with_predicate_returns_matches_in_order() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");
    let schema = row_schema();

    let mut table = Table::create(&path, &schema)?;
    insert_rows(&mut table, 10)?;

    // a >= 5, spelled as NOT (a < 5).
    let pred = Expression::not(Expression::smaller(
        Expression::attr(0),
        Expression::constant(Value::Int(5)),
    ));

    let mut matches = Vec::new();
    let mut scan = table.start_scan(Some(pred))?;
    loop {
        match scan.next() {
            Ok(record) => matches.push(record.get_attr(&schema, 0)?),
            Err(err) => {
                assert_eq!(Error::NoMoreTuples, err.downcast::<Error>()?);
                break;
            }
        }
    }

    let expected: Vec<Value> = (5..10).map(Value::Int).collect();
    assert_eq!(expected, matches);

    table.close()?;
    Ok(())
}

#[test]
fn test_scan_without_predicate_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");

    let mut table = Table::create(&path, &row_schema())?;
    let err = table.start_scan(None).unwrap_err();
    assert_eq!(Error::ScanConditionNotFound, err.downcast::<Error>()?);

    table.close()?;
    Ok(())
}

#[test]
fn test_delete_record() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");

    let mut table = Table::create(&path, &row_schema())?;
    let rids = insert_rows(&mut table, 10)?;

    table.delete_record(rids[3])?;
    assert_eq!(9, table.num_tuples());

    let err = table.get_record(rids[3]).unwrap_err();
    assert_eq!(Error::NoTupleWithGivenRid, err.downcast::<Error>()?);

    // The other records are untouched.
    let record = table.get_record(rids[4])?;
    assert_eq!(Value::Int(4), record.get_attr(table.schema(), 0)?);

    table.close()?;
    Ok(())
}

#[test]
fn test_deleted_records_are_skipped_by_scans() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");
    let schema = row_schema();

    let mut table = Table::create(&path, &schema)?;
    let rids = insert_rows(&mut table, 6)?;
    table.delete_record(rids[0])?;
    table.delete_record(rids[5])?;

    let always = Expression::constant(Value::Bool(true));
    let mut seen = Vec::new();
    let mut scan = table.start_scan(Some(always))?;
    while let Ok(record) = scan.next() {
        seen.push(record.get_attr(&schema, 0)?);
    }

    let expected: Vec<Value> = (1..5).map(Value::Int).collect();
    assert_eq!(expected, seen);

    table.close()?;
    Ok(())
}

#[test]
fn test_update_record() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");
    let schema = row_schema();

    let mut table = Table::create(&path, &schema)?;
    let rids = insert_rows(&mut table, 3)?;

    let mut record = table.get_record(rids[1])?;
    record.set_attr(&schema, 0, &Value::Int(99))?;
    table.update_record(&record)?;

    let record = table.get_record(rids[1])?;
    assert_eq!(Value::Int(99), record.get_attr(&schema, 0)?);
    assert_eq!(3, table.num_tuples());

    table.close()?;
    Ok(())
}

#[test]
fn test_update_resurrects_deleted_slot() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");
    let schema = row_schema();

    let mut table = Table::create(&path, &schema)?;
    let rids = insert_rows(&mut table, 3)?;

    table.delete_record(rids[2])?;
    assert_eq!(2, table.num_tuples());

    // Updating a freed slot force-marks it occupied again; the tuple
    // count stays where the delete left it.
    let mut record = Record::new(&schema);
    record.set_attr(&schema, 0, &Value::Int(7))?;
    record.id = Some(rids[2]);
    table.update_record(&record)?;

    let record = table.get_record(rids[2])?;
    assert_eq!(Value::Int(7), record.get_attr(&schema, 0)?);
    assert_eq!(2, table.num_tuples());

    table.close()?;
    Ok(())
}

#[test]
fn test_inserts_span_pages_and_reuse_freed_slots() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");

    // Two slots per page: 1 tombstone + 4 + 2000 = 2005 bytes a record.
    let schema = Schema::new(vec![
        Attribute::new("a", DataType::Int, 0),
        Attribute::new("pad", DataType::String, 2000),
    ]);

    let mut table = Table::create(&path, &schema)?;
    let mut rids = Vec::new();
    for i in 0..5 {
        let mut record = Record::new(&schema);
        record.set_attr(&schema, 0, &Value::Int(i))?;
        table.insert_record(&mut record)?;
        rids.push(record.id.unwrap());
    }

    // Slots fill in (page, slot) order starting at page 1.
    let pages: Vec<u32> = rids.iter().map(|rid| rid.page).collect();
    let slots: Vec<usize> = rids.iter().map(|rid| rid.slot).collect();
    assert_eq!(vec![1, 1, 2, 2, 3], pages);
    assert_eq!(vec![0, 1, 0, 1, 0], slots);

    // Deleting a record on an earlier page moves the free hint back, so
    // the next insert lands in the freed slot.
    table.delete_record(rids[1])?;
    let mut record = Record::new(&schema);
    record.set_attr(&schema, 0, &Value::Int(42))?;
    table.insert_record(&mut record)?;
    assert_eq!(Some(rids[1]), record.id);
    assert_eq!(5, table.num_tuples());

    table.close()?;
    Ok(())
}

#[test]
fn test_table_survives_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");
    let schema = Schema::with_keys(
        vec![
            Attribute::new("a", DataType::Int, 0),
            Attribute::new("b", DataType::String, 4),
        ],
        vec![0],
    );

    let rids = {
        let mut table = Table::create(&path, &schema)?;
        let rids = insert_rows(&mut table, 10)?;
        table.delete_record(rids[0])?;
        table.close()?;
        rids
    };

    let mut table = Table::open(&path)?;
    assert_eq!(&schema, table.schema());
    assert_eq!(9, table.num_tuples());

    let record = table.get_record(rids[7])?;
    assert_eq!(Value::Int(7), record.get_attr(&schema, 0)?);

    let err = table.get_record(rids[0]).unwrap_err();
    assert_eq!(Error::NoTupleWithGivenRid, err.downcast::<Error>()?);

    table.close()?;
    Ok(())
}

#[test]
fn test_multiple_tables_coexist() -> Result<()> {
    let dir = TempDir::new()?;
    let schema = row_schema();

    let mut first = Table::create(&table_path(&dir, "t1"), &schema)?;
    let mut second = Table::create(&table_path(&dir, "t2"), &schema)?;

    insert_rows(&mut first, 4)?;
    insert_rows(&mut second, 2)?;

    assert_eq!(4, first.num_tuples());
    assert_eq!(2, second.num_tuples());

    first.close()?;
    second.close()?;
    Ok(())
}

#[test]
fn test_destroy_removes_heap_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = table_path(&dir, "t1");

    let table = Table::create(&path, &row_schema())?;
    table.close()?;

    Table::destroy(&path)?;
    assert!(Table::open(&path).is_err());
    Ok(())
}
