mod common;

use std::cell::Cell;

use common::{init_logger, seoul_stores};

use store_batch_rs::{
    core::{
        item::{ItemProcessor, ItemProcessorResult, ItemReader},
        job::{BatchStatus, Job, JobBuilder, JobParameters},
        step::StepBuilder,
    },
    item::{
        cursor::CursorItemReaderBuilder,
        memory::{Managed, MemoryItemWriter, MemoryTable},
        paging::{N1PagingItemReaderBuilder, PagingItemReaderBuilder, PagingMode},
    },
    store::Store,
    BatchError,
};

fn read_ids(reader: &dyn ItemReader<Managed<Store>>) -> Result<Vec<i64>, BatchError> {
    let mut ids = Vec::new();
    while let Some(store) = reader.read()? {
        ids.push(store.borrow().id);
    }
    Ok(ids)
}

/// Renames every store it sees and fails on item number `fail_on`.
struct RenamingProcessor {
    seen: Cell<usize>,
    fail_on: usize,
}

impl ItemProcessor<Managed<Store>, String> for RenamingProcessor {
    fn process(&self, item: &Managed<Store>) -> ItemProcessorResult<String> {
        self.seen.set(self.seen.get() + 1);
        item.borrow_mut().name.push_str("-touched");
        if self.seen.get() == self.fail_on {
            return Err(BatchError::ItemProcessor(format!(
                "item {} rejected",
                self.fail_on
            )));
        }
        Ok(Some(item.borrow().name.clone()))
    }
}

#[test]
fn readers_return_the_same_rows_in_the_same_order() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(11);
    let query = database.query();

    let cursor = CursorItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .fetch_size(4)
        .build()?;
    let transacted = PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .page_size(4)
        .mode(PagingMode::Transacted)
        .build()?;
    let detached = PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .page_size(4)
        .mode(PagingMode::Detached)
        .build()?;
    let n1 = N1PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .page_size(4)
        .build()?;

    let expected: Vec<i64> = (1..=11).collect();
    let readers: [&dyn ItemReader<Managed<Store>>; 4] = [&cursor, &transacted, &detached, &n1];
    for reader in readers {
        reader.open()?;
        assert_eq!(read_ids(reader)?, expected);
        reader.close()?;
    }
    Ok(())
}

#[test]
fn paging_keeps_one_page_in_memory() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(10);
    let query = database.query();
    let reader = PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .page_size(3)
        .mode(PagingMode::Transacted)
        .build()?;

    reader.open()?;
    let mut largest_page = 0;
    let mut largest_tracked = 0;
    while reader.read()?.is_some() {
        largest_page = largest_page.max(reader.buffered());
        largest_tracked = largest_tracked.max(database.tracked_entities());
    }
    reader.close()?;

    assert_eq!(largest_page, 3);
    assert_eq!(largest_tracked, 3);
    assert_eq!(database.tracked_entities(), 0);
    Ok(())
}

#[test]
fn detached_paging_tracks_nothing() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(5);
    let query = database.query();
    let reader = PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .page_size(2)
        .transacted(false)
        .build()?;

    reader.open()?;
    while reader.read()?.is_some() {
        assert_eq!(database.tracked_entities(), 0);
    }
    reader.close()?;
    Ok(())
}

#[test]
fn cursor_releases_entities_at_each_update() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(9);
    let query = database.query();
    let reader = CursorItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .fetch_size(3)
        .build()?;

    reader.open()?;
    for _ in 0..3 {
        for _ in 0..3 {
            assert!(reader.read()?.is_some());
        }
        assert_eq!(database.tracked_entities(), 3);
        reader.update()?;
        assert_eq!(database.tracked_entities(), 0);
    }
    assert!(reader.read()?.is_none());
    reader.close()?;
    Ok(())
}

#[test]
fn n1_reader_costs_one_round_trip_per_collection_and_parent() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(5);
    let query = database.query();

    let paging = PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .page_size(2)
        .build()?;
    database.reset_round_trips();
    paging.open()?;
    let paged = read_ids(&paging)?;
    paging.close()?;
    let paging_round_trips = database.round_trips();

    let n1 = N1PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .page_size(2)
        .build()?;
    database.reset_round_trips();
    n1.open()?;
    let n1_ids = read_ids(&n1)?;
    n1.close()?;

    assert_eq!(paged, n1_ids);
    // Pages of 2, 2 and 1 stores.
    assert_eq!(paging_round_trips, 3);
    // Each of the 5 stores loads its products and its employees.
    assert_eq!(n1.collection_loads(), 10);
    assert_eq!(database.round_trips(), 3 + 10);
    Ok(())
}

#[test]
fn cursor_fetches_one_window_per_round_trip() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(5);
    let query = database.query();
    let reader = CursorItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .fetch_size(2)
        .build()?;

    database.reset_round_trips();
    reader.open()?;
    assert_eq!(read_ids(&reader)?.len(), 5);
    reader.close()?;

    assert_eq!(database.round_trips(), 3);
    Ok(())
}

#[test]
fn restart_positions_match_a_full_scan() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(8);
    let query = database.query();

    for start in [0, 3, 4, 8, 12] {
        let cursor = CursorItemReaderBuilder::<Managed<Store>>::new()
            .source(&query)
            .fetch_size(3)
            .build()?;
        let paging = PagingItemReaderBuilder::<Managed<Store>>::new()
            .source(&query)
            .page_size(3)
            .build()?;

        let expected: Vec<i64> = (1..=8).skip(start).collect();
        let readers: [&dyn ItemReader<Managed<Store>>; 2] = [&cursor, &paging];
        for reader in readers {
            reader.open()?;
            reader.jump_to_item(start)?;
            assert_eq!(read_ids(reader)?, expected, "start {}", start);
            reader.close()?;
        }
    }
    Ok(())
}

#[test]
fn open_twice_and_unavailable_source() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(2);
    let query = database.query();
    let reader = PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .build()?;

    reader.open()?;
    assert!(matches!(reader.open(), Err(BatchError::AlreadyOpen(_))));
    reader.close()?;

    database.set_available(false);
    assert!(matches!(
        reader.open(),
        Err(BatchError::ResourceUnavailable(_))
    ));
    assert_eq!(database.open_sessions(), 0);
    Ok(())
}

#[test]
fn transacted_paging_never_writes_entity_changes_back() -> anyhow::Result<()> {
    init_logger();
    let database = seoul_stores(6);
    let before = database.rows();
    let query = database.query();
    let reader = PagingItemReaderBuilder::<Managed<Store>>::new()
        .source(&query)
        .page_size(2)
        .mode(PagingMode::Transacted)
        .build()?;
    let processor = RenamingProcessor {
        seen: Cell::new(0),
        fail_on: 3,
    };
    let output = MemoryTable::new();
    let writer = MemoryItemWriter::new(&output);

    let step = StepBuilder::new("renaming_step")
        .chunk::<Managed<Store>, String>(4)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .transaction_manager(&output)
        .build()?;
    let execution = JobBuilder::new()
        .name("renaming")
        .start(&step)
        .build()
        .run(&JobParameters::new());

    assert_eq!(execution.status, BatchStatus::Failed);
    assert!(output.is_empty());
    // The page switch inside the failed chunk must not persist the renames.
    assert_eq!(database.rows(), before);
    assert!(database
        .rows()
        .iter()
        .all(|store| !store.name.ends_with("-touched")));
    Ok(())
}
