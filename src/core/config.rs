use std::env;

use serde::Deserialize;

use crate::BatchError;

const DEFAULT_CHUNK_SIZE: usize = 10;

/// Job-level knobs.
///
/// Page and fetch sizes follow the chunk size unless set, which keeps one page
/// or one cursor window per chunk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchProperties {
    pub job_name: Option<String>,
    pub chunk_size: usize,
    pub page_size: Option<usize>,
    pub fetch_size: Option<i32>,
}

impl Default for BatchProperties {
    fn default() -> Self {
        Self {
            job_name: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            page_size: None,
            fetch_size: None,
        }
    }
}

impl BatchProperties {
    pub fn from_json(json: &str) -> Result<Self, BatchError> {
        let properties: BatchProperties =
            serde_json::from_str(json).map_err(|e| BatchError::InvalidConfig(e.to_string()))?;
        properties.validate()
    }

    /// Defaults overridden by `BATCH_JOB_NAME`, `BATCH_CHUNK_SIZE`,
    /// `BATCH_PAGE_SIZE` and `BATCH_FETCH_SIZE`.
    pub fn from_env() -> Result<Self, BatchError> {
        Self::default().with_overrides(|name| env::var(name).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, BatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(job_name) = lookup("BATCH_JOB_NAME") {
            self.job_name = Some(job_name);
        }
        if let Some(value) = lookup("BATCH_CHUNK_SIZE") {
            self.chunk_size = parse("BATCH_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = lookup("BATCH_PAGE_SIZE") {
            self.page_size = Some(parse("BATCH_PAGE_SIZE", &value)?);
        }
        if let Some(value) = lookup("BATCH_FETCH_SIZE") {
            self.fetch_size = Some(parse("BATCH_FETCH_SIZE", &value)?);
        }
        self.validate()
    }

    pub fn validate(self) -> Result<Self, BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::InvalidConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.page_size == Some(0) {
            return Err(BatchError::InvalidConfig(
                "page size must be positive".to_string(),
            ));
        }
        if self.fetch_size.is_some_and(|fetch_size| fetch_size < 0) {
            return Err(BatchError::InvalidConfig(
                "fetch size must not be negative".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(self.chunk_size)
    }

    pub fn fetch_size(&self) -> i32 {
        self.fetch_size
            .unwrap_or_else(|| i32::try_from(self.chunk_size).unwrap_or(i32::MAX))
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, BatchError> {
    value
        .trim()
        .parse()
        .map_err(|_| BatchError::InvalidConfig(format!("{name}: invalid value {value:?}")))
}
