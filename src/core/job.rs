use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use log::{error, info};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    checkpoint::ExecutionKey,
    step::{Step, StepExecution},
};

/// Overall status of a job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// All steps completed.
    Completed,
    /// A step failed; the remaining steps were not run.
    Failed,
}

/// Parameters identifying a job execution, such as the address prefix of the
/// stores to back up.
///
/// Together with the job and step names they form the checkpoint key, so two
/// runs with the same parameters resume each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobParameters {
    parameters: BTreeMap<String, String>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_string(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }
}

/// Represents a job that can be executed.
pub trait Job {
    /// Runs every step in order and reports the outcome.
    ///
    /// A failure never escapes as a panic or an `Err`: it is recorded on the
    /// returned execution together with the progress made before it.
    fn run(&self, parameters: &JobParameters) -> JobExecution;
}

/// Outcome of one job run.
#[derive(Debug)]
pub struct JobExecution {
    pub id: Uuid,
    pub name: String,
    pub parameters: JobParameters,
    pub status: BatchStatus,
    pub start: Instant,
    pub end: Instant,
    pub duration: Duration,
    /// Executions of the steps that were started, in order
    pub step_executions: Vec<StepExecution>,
    /// Error of the failing step
    pub failure: Option<BatchError>,
}

impl JobExecution {
    pub fn get_step_execution(&self, name: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|step| step.name == name)
    }
}

pub struct JobInstance<'a> {
    id: Uuid,
    name: String,
    steps: Vec<&'a dyn Step>,
}

impl JobInstance<'_> {
    pub fn get_name(&self) -> &str {
        &self.name
    }
}

impl Job for JobInstance<'_> {
    fn run(&self, parameters: &JobParameters) -> JobExecution {
        let start = Instant::now();

        info!("Start of job: {}, id: {}", self.name, self.id);

        let mut step_executions = Vec::with_capacity(self.steps.len());
        let mut failure = None;

        for step in &self.steps {
            let key = ExecutionKey::new(&self.name, parameters.as_map(), step.get_name());
            let mut step_execution = StepExecution::new(step.get_name(), key);

            let result = step.execute(&mut step_execution);
            step_executions.push(step_execution);

            if let Err(error) = result {
                error!("Job {} stopped by step {}: {}", self.name, step.get_name(), error);
                failure = Some(error);
                break;
            }
        }

        let status = if failure.is_some() {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        };

        info!(
            "End of job: {}, id: {}, status: {:?}",
            self.name, self.id, status
        );

        JobExecution {
            id: self.id,
            name: self.name.clone(),
            parameters: parameters.clone(),
            status,
            start,
            end: Instant::now(),
            duration: start.elapsed(),
            step_executions,
            failure,
        }
    }
}

#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    steps: Vec<&'a dyn Step>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> JobBuilder<'a> {
        self.name = Some(name.to_string());
        self
    }

    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> JobInstance<'a> {
        JobInstance {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
        }
    }
}
