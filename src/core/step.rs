use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    checkpoint::{CheckpointStore, ExecutionKey, RestartState},
    chunk::{Chunk, ChunkStatus},
    item::{ItemProcessor, ItemReader, ItemWriter},
    tasklet::{Tasklet, TaskletBuilder},
    transaction::TransactionManager,
};

/// Lifecycle of one execution. `Completed` and `Failed` are terminal: a failed
/// execution is resumed by starting a new one with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// Bookkeeping of a single step execution.
#[derive(Debug)]
pub struct StepExecution {
    /// Unique identifier for this execution
    pub id: Uuid,
    pub name: String,
    /// Identity under which the checkpoint is stored
    pub key: ExecutionKey,
    pub status: StepStatus,
    pub start_time: Option<Instant>,
    pub end_time: Option<Instant>,
    pub duration: Duration,
    /// Raw items read in committed chunks
    pub read_count: usize,
    /// Raw items dropped by the processor in committed chunks
    pub filter_count: usize,
    /// Items handed to the writer in committed chunks
    pub write_count: usize,
    pub commit_count: usize,
    pub rollback_count: usize,
    /// Checkpoint loaded when the execution started
    pub start_position: usize,
    /// Checkpoint after the last committed chunk
    pub checkpoint: usize,
    /// Error that ended the execution, if any
    pub failure: Option<BatchError>,
}

impl StepExecution {
    pub fn new(name: &str, key: ExecutionKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            key,
            status: StepStatus::NotStarted,
            start_time: None,
            end_time: None,
            duration: Duration::ZERO,
            read_count: 0,
            filter_count: 0,
            write_count: 0,
            commit_count: 0,
            rollback_count: 0,
            start_position: 0,
            checkpoint: 0,
            failure: None,
        }
    }
}

pub trait Step {
    fn get_name(&self) -> &str;

    /// Executes the step, recording progress and outcome on `step_execution`.
    ///
    /// # Returns
    /// - `Ok(())`: the step completed
    /// - `Err(BatchError)`: the step failed; the same error is kept in
    ///   `step_execution.failure`
    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError>;
}

/// Read-process-write loop over fixed-size chunks.
///
/// Each chunk runs inside one transaction: items are read one at a time and
/// transformed as they arrive until `chunk_size` raw items were consumed or
/// the reader is exhausted, then the whole chunk goes to the writer. A read,
/// process or write failure rolls the chunk back and fails the execution.
/// After a commit the checkpoint advances by the raw items consumed.
///
/// On start the reader is fast-forwarded to the persisted checkpoint, so the
/// skipped items are never processed or written again.
pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    reader: &'a dyn ItemReader<I>,
    processor: &'a dyn ItemProcessor<I, O>,
    writer: &'a dyn ItemWriter<O>,
    transaction_manager: Option<&'a dyn TransactionManager>,
    checkpoint_store: Option<&'a dyn CheckpointStore>,
    chunk_size: usize,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        let start_time = Instant::now();
        step_execution.start_time = Some(start_time);
        step_execution.status = StepStatus::Running;

        info!(
            "Start of step: {}, id: {}",
            step_execution.name, step_execution.id
        );

        let mut result = self.run_chunks(step_execution);

        if let Err(close_error) = self.reader.close() {
            warn!("Error closing reader: {}", close_error);
            result = result.and(Err(close_error));
        }
        if let Err(close_error) = self.writer.close() {
            warn!("Error closing writer: {}", close_error);
            result = result.and(Err(close_error));
        }

        step_execution.end_time = Some(Instant::now());
        step_execution.duration = start_time.elapsed();

        match result {
            Ok(()) => {
                step_execution.status = StepStatus::Completed;
                info!(
                    "End of step: {}, id: {}, read: {}, written: {}, checkpoint: {}",
                    step_execution.name,
                    step_execution.id,
                    step_execution.read_count,
                    step_execution.write_count,
                    step_execution.checkpoint
                );
                Ok(())
            }
            Err(error) => {
                step_execution.status = StepStatus::Failed;
                step_execution.failure = Some(error.clone());
                error!(
                    "Step {} failed at checkpoint {}: {}",
                    step_execution.name, step_execution.checkpoint, error
                );
                Err(error)
            }
        }
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O> {
    fn run_chunks(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        self.reader.open()?;
        self.writer.open()?;

        let restart_state = self
            .checkpoint_store
            .map(|store| RestartState::new(store, step_execution.key.clone()));

        let mut position = match &restart_state {
            Some(state) => state.load()?,
            None => 0,
        };
        step_execution.start_position = position;
        step_execution.checkpoint = position;

        if position > 0 {
            info!(
                "Restarting step {} after {} processed items",
                step_execution.name, position
            );
            self.reader.jump_to_item(position)?;
        }

        loop {
            self.begin()?;

            let chunk = match self.read_chunk() {
                Ok(chunk) => chunk,
                Err(error) => {
                    self.rollback(step_execution, &error);
                    return Err(error);
                }
            };

            if chunk.is_empty() {
                debug!("Nothing left to read");
                self.commit()?;
                return Ok(());
            }

            if let Err(error) = self.write_chunk(&chunk) {
                self.rollback(step_execution, &error);
                return Err(error);
            }

            if let Err(error) = self.commit() {
                self.rollback(step_execution, &error);
                return Err(error);
            }

            position += chunk.get_consumed();
            step_execution.commit_count += 1;
            step_execution.read_count += chunk.get_consumed();
            step_execution.filter_count += chunk.get_filtered();
            step_execution.write_count += chunk.get_items().len();
            step_execution.checkpoint = position;

            if let Some(state) = &restart_state {
                state.save(position)?;
            }
            self.reader.update()?;

            if chunk.get_status() == ChunkStatus::Finished {
                return Ok(());
            }
        }
    }

    /// Reads and transforms up to `chunk_size` raw items.
    fn read_chunk(&self) -> Result<Chunk<O>, BatchError> {
        debug!("Start reading chunk");
        let mut chunk = Chunk::new(self.chunk_size);

        while !chunk.is_full() {
            match self.reader.read()? {
                Some(item) => {
                    let processed = self.processor.process(&item)?;
                    chunk.add_item(processed);
                }
                None => {
                    chunk.finish();
                    break;
                }
            }
        }

        debug!(
            "End reading chunk: {} consumed, {} kept, {:?}",
            chunk.get_consumed(),
            chunk.get_items().len(),
            chunk.get_status()
        );
        Ok(chunk)
    }

    fn write_chunk(&self, chunk: &Chunk<O>) -> Result<(), BatchError> {
        let items = chunk.get_items();
        if items.is_empty() {
            debug!("No items to write, skipping write call");
            return Ok(());
        }

        debug!("Writing chunk of {} items", items.len());
        self.writer.write(items)?;
        self.writer.flush()
    }

    fn begin(&self) -> Result<(), BatchError> {
        match self.transaction_manager {
            Some(manager) => manager.begin(),
            None => Ok(()),
        }
    }

    fn commit(&self) -> Result<(), BatchError> {
        match self.transaction_manager {
            Some(manager) => manager.commit(),
            None => Ok(()),
        }
    }

    fn rollback(&self, step_execution: &mut StepExecution, cause: &BatchError) {
        warn!(
            "Rolling back chunk of step {} after: {}",
            step_execution.name, cause
        );
        step_execution.rollback_count += 1;
        if let Some(manager) = self.transaction_manager {
            if let Err(error) = manager.rollback() {
                error!("Rollback failed: {}", error);
            }
        }
    }
}

pub struct ChunkOrientedStepBuilder<'a, I, O> {
    name: String,
    reader: Option<&'a dyn ItemReader<I>>,
    processor: Option<&'a dyn ItemProcessor<I, O>>,
    writer: Option<&'a dyn ItemWriter<O>>,
    transaction_manager: Option<&'a dyn TransactionManager>,
    checkpoint_store: Option<&'a dyn CheckpointStore>,
    chunk_size: usize,
}

impl<'a, I, O> ChunkOrientedStepBuilder<'a, I, O> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reader: None,
            processor: None,
            writer: None,
            transaction_manager: None,
            checkpoint_store: None,
            chunk_size: 10,
        }
    }

    pub fn reader(mut self, reader: &'a dyn ItemReader<I>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<I, O>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a dyn ItemWriter<O>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Transaction boundary of each chunk. Without one, chunks are not rolled
    /// back on failure.
    pub fn transaction_manager(mut self, transaction_manager: &'a dyn TransactionManager) -> Self {
        self.transaction_manager = Some(transaction_manager);
        self
    }

    /// Enables restart: the step resumes from, and records its progress to,
    /// this store.
    pub fn checkpoint_store(mut self, checkpoint_store: &'a dyn CheckpointStore) -> Self {
        self.checkpoint_store = Some(checkpoint_store);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn build(self) -> Result<ChunkOrientedStep<'a, I, O>, BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::InvalidConfig(format!(
                "chunk size of step {} must be positive",
                self.name
            )));
        }
        let missing = |part: &str| {
            BatchError::InvalidConfig(format!("{part} is required for building step {}", self.name))
        };

        Ok(ChunkOrientedStep {
            reader: self.reader.ok_or_else(|| missing("reader"))?,
            processor: self.processor.ok_or_else(|| missing("processor"))?,
            writer: self.writer.ok_or_else(|| missing("writer"))?,
            transaction_manager: self.transaction_manager,
            checkpoint_store: self.checkpoint_store,
            chunk_size: self.chunk_size,
            name: self.name,
        })
    }
}

pub struct StepBuilder {
    name: String,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Step with a generated name.
    pub fn unnamed() -> Self {
        Self::new(&build_name())
    }

    pub fn tasklet<'a>(self, tasklet: &'a dyn Tasklet) -> TaskletBuilder<'a> {
        TaskletBuilder::new(&self.name).tasklet(tasklet)
    }

    pub fn chunk<'a, I, O>(self, chunk_size: usize) -> ChunkOrientedStepBuilder<'a, I, O> {
        ChunkOrientedStepBuilder::new(&self.name).chunk_size(chunk_size)
    }
}
