use std::time::Instant;

use log::{error, info};

use crate::BatchError;

use super::step::{Step, StepExecution, StepStatus};

pub enum RepeatStatus {
    /// The tasklet wants to be called again.
    Continuable,
    /// The tasklet has finished executing.
    Finished,
}

/// A step body that is not chunk oriented, such as seeding a table.
pub trait Tasklet {
    fn execute(&self, step_execution: &StepExecution) -> Result<RepeatStatus, BatchError>;
}

pub struct TaskletStep<'a> {
    name: String,
    tasklet: &'a dyn Tasklet,
}

impl Step for TaskletStep<'_> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        let start_time = Instant::now();
        step_execution.start_time = Some(start_time);
        step_execution.status = StepStatus::Running;
        info!("Start of tasklet step: {}", self.name);

        let result = loop {
            match self.tasklet.execute(step_execution) {
                Ok(RepeatStatus::Continuable) => continue,
                Ok(RepeatStatus::Finished) => break Ok(()),
                Err(error) => break Err(error),
            }
        };

        step_execution.end_time = Some(Instant::now());
        step_execution.duration = start_time.elapsed();

        match result {
            Ok(()) => {
                step_execution.status = StepStatus::Completed;
                info!("End of tasklet step: {}", self.name);
                Ok(())
            }
            Err(error) => {
                error!("Tasklet step {} failed: {}", self.name, error);
                step_execution.status = StepStatus::Failed;
                step_execution.failure = Some(error.clone());
                Err(error)
            }
        }
    }
}

pub struct TaskletBuilder<'a> {
    name: String,
    tasklet: Option<&'a dyn Tasklet>,
}

impl<'a> TaskletBuilder<'a> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tasklet: None,
        }
    }

    pub fn tasklet(mut self, tasklet: &'a dyn Tasklet) -> Self {
        self.tasklet = Some(tasklet);
        self
    }

    pub fn build(self) -> Result<TaskletStep<'a>, BatchError> {
        let tasklet = self.tasklet.ok_or_else(|| {
            BatchError::InvalidConfig(format!("tasklet is required for building step {}", self.name))
        })?;
        Ok(TaskletStep {
            name: self.name,
            tasklet,
        })
    }
}
