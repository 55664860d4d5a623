use log::info;

use crate::{
    core::{
        checkpoint::CheckpointStore,
        config::BatchProperties,
        item::ItemReader,
        job::{Job, JobBuilder, JobExecution, JobParameters},
        step::StepBuilder,
    },
    error::BatchError,
    item::{
        cursor::CursorItemReaderBuilder,
        memory::{Managed, MemoryDatabase, MemoryItemWriter, MemoryQuery, MemoryTable},
        paging::{N1PagingItemReaderBuilder, PagingItemReaderBuilder, PagingMode},
    },
};

use super::{
    domain::{Store, StoreHistory},
    processor::{FaultInjector, StoreHistoryProcessor},
    seed::{SeedStoresTasklet, StoreSeed},
};

pub const STORE_BACKUP_JOB: &str = "storeBackupBatch";
pub const N1_PAGING_JOB: &str = "n1PagingJob";

/// Job parameter holding the address prefix of the stores to back up.
pub const ADDRESS_PARAMETER: &str = "address";

/// Reader feeding the backup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderKind {
    Cursor,
    PagingTransacted,
    PagingDetached,
    N1Paging,
}

/// Stores whose address starts with `prefix` (`address LIKE 'prefix%'`), all
/// stores when there is none.
pub fn address_query(database: &MemoryDatabase<Store>, prefix: Option<&str>) -> MemoryQuery<Store> {
    match prefix {
        Some(prefix) => {
            let prefix = prefix.to_string();
            database.query_where(move |store: &Store| store.address.starts_with(&prefix))
        }
        None => database.query(),
    }
}

/// Copies stores into the history table, one chunk transaction at a time.
///
/// The history table is also the chunk transaction manager, so a failed chunk
/// leaves no row behind. Progress is recorded in `checkpoints` under the job
/// name, the parameters and the step name; running again with the same
/// parameters resumes after the last committed chunk.
pub struct StoreBackupJob<'a> {
    name: String,
    database: &'a MemoryDatabase<Store>,
    history: &'a MemoryTable<StoreHistory>,
    checkpoints: &'a dyn CheckpointStore,
    properties: BatchProperties,
    reader_kind: ReaderKind,
    seed: Option<StoreSeed>,
}

impl<'a> StoreBackupJob<'a> {
    /// Single step job reading stores through a cursor.
    pub fn store_backup(
        database: &'a MemoryDatabase<Store>,
        history: &'a MemoryTable<StoreHistory>,
        checkpoints: &'a dyn CheckpointStore,
    ) -> Self {
        Self {
            name: STORE_BACKUP_JOB.to_string(),
            database,
            history,
            checkpoints,
            properties: BatchProperties::default(),
            reader_kind: ReaderKind::Cursor,
            seed: None,
        }
    }

    /// Seeds `seed` stores, then backs them up through the N+1 paging reader.
    pub fn n1_paging(
        database: &'a MemoryDatabase<Store>,
        history: &'a MemoryTable<StoreHistory>,
        checkpoints: &'a dyn CheckpointStore,
        seed: StoreSeed,
    ) -> Self {
        Self {
            name: N1_PAGING_JOB.to_string(),
            reader_kind: ReaderKind::N1Paging,
            seed: Some(seed),
            ..Self::store_backup(database, history, checkpoints)
        }
    }

    /// Chunk, page and fetch sizes; a `job_name` replaces the default name.
    pub fn properties(mut self, properties: BatchProperties) -> Self {
        if let Some(job_name) = &properties.job_name {
            self.name = job_name.clone();
        }
        self.properties = properties;
        self
    }

    pub fn reader_kind(mut self, reader_kind: ReaderKind) -> Self {
        self.reader_kind = reader_kind;
        self
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Runs the job.
    ///
    /// # Errors
    /// Only invalid configuration is returned as an error. A failure while
    /// running is reported on the returned execution.
    pub fn run(
        &self,
        parameters: &JobParameters,
        faults: &dyn FaultInjector,
    ) -> Result<JobExecution, BatchError> {
        let properties = self.properties.clone().validate()?;
        let query = address_query(self.database, parameters.get(ADDRESS_PARAMETER));
        let reader = self.reader(&query, &properties)?;
        let processor = StoreHistoryProcessor::new(faults);
        let writer = MemoryItemWriter::new(self.history);

        let step = StepBuilder::new(&format!("{}_step", self.name))
            .chunk(properties.chunk_size)
            .reader(reader.as_ref())
            .processor(&processor)
            .writer(&writer)
            .transaction_manager(self.history)
            .checkpoint_store(self.checkpoints)
            .build()?;

        let seeder = self
            .seed
            .as_ref()
            .map(|seed| SeedStoresTasklet::new(self.database, seed.clone()));
        let init_step = match &seeder {
            Some(seeder) => Some(
                StepBuilder::new(&format!("{}_initData", self.name))
                    .tasklet(seeder)
                    .build()?,
            ),
            None => None,
        };

        let mut builder = JobBuilder::new().name(&self.name);
        if let Some(init_step) = &init_step {
            builder = builder.start(init_step);
        }
        let job = builder.next(&step).build();

        info!(
            "Running {} with {:?} reader, chunk size {}",
            self.name, self.reader_kind, properties.chunk_size
        );
        Ok(job.run(parameters))
    }

    fn reader<'q>(
        &self,
        query: &'q MemoryQuery<Store>,
        properties: &BatchProperties,
    ) -> Result<Box<dyn ItemReader<Managed<Store>> + 'q>, BatchError> {
        let reader_name = format!("{}_reader", self.name);
        let reader: Box<dyn ItemReader<Managed<Store>> + 'q> = match self.reader_kind {
            ReaderKind::Cursor => Box::new(
                CursorItemReaderBuilder::<Managed<Store>>::new()
                    .name(&reader_name)
                    .source(query)
                    .fetch_size(properties.fetch_size())
                    .build()?,
            ),
            ReaderKind::PagingTransacted | ReaderKind::PagingDetached => Box::new(
                PagingItemReaderBuilder::<Managed<Store>>::new()
                    .name(&reader_name)
                    .source(query)
                    .page_size(properties.page_size())
                    .mode(if self.reader_kind == ReaderKind::PagingTransacted {
                        PagingMode::Transacted
                    } else {
                        PagingMode::Detached
                    })
                    .build()?,
            ),
            ReaderKind::N1Paging => Box::new(
                N1PagingItemReaderBuilder::<Managed<Store>>::new()
                    .name(&reader_name)
                    .source(query)
                    .page_size(properties.page_size())
                    .build()?,
            ),
        };
        Ok(reader)
    }
}
