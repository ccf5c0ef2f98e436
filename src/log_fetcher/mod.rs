use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Error;

pub mod aws;
pub mod fake;

pub use aws::AwsLogFetcher;
pub use fake::FakeLogFetcher;

/// One Logs Insights query, validated at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryRequest {
    log_group: String,
    query: String,
    start_epoch: i64,
    end_epoch: i64,
}

impl QueryRequest {
    pub fn new(
        log_group: impl Into<String>,
        query: impl Into<String>,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<Self, Error> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(Error::MissingQuery);
        }
        if start_epoch > end_epoch {
            return Err(Error::InvalidTimeRange {
                start: start_epoch,
                end: end_epoch,
            });
        }
        Ok(Self {
            log_group: log_group.into(),
            query,
            start_epoch,
            end_epoch,
        })
    }

    /// Same request aimed at `log_group`, used once a pattern is resolved.
    pub fn for_log_group(&self, log_group: impl Into<String>) -> Self {
        Self {
            log_group: log_group.into(),
            ..self.clone()
        }
    }

    pub fn log_group(&self) -> &str {
        &self.log_group
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn start_epoch(&self) -> i64 {
        self.start_epoch
    }

    pub fn end_epoch(&self) -> i64 {
        self.end_epoch
    }
}

/// Opaque id of a submitted query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryHandle(String);

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    Timeout,
}

impl QueryStatus {
    /// Scheduled and Running keep the poll loop going.
    pub fn is_pending(self) -> bool {
        matches!(self, QueryStatus::Scheduled | QueryStatus::Running)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryStatus::Scheduled => "Scheduled",
            QueryStatus::Running => "Running",
            QueryStatus::Complete => "Complete",
            QueryStatus::Failed => "Failed",
            QueryStatus::Cancelled => "Cancelled",
            QueryStatus::Timeout => "Timeout",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResultField {
    pub field: String,
    pub value: String,
}

impl ResultField {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

pub type ResultRow = Vec<ResultField>;

pub struct StatusReport {
    pub status: QueryStatus,
    /// Only populated once the status is `Complete`.
    pub rows: Vec<ResultRow>,
}

#[async_trait]
pub trait LogService: Send + Sync {
    async fn submit_query(&self, request: &QueryRequest) -> Result<QueryHandle, Error>;

    async fn query_status(&self, handle: &QueryHandle) -> Result<StatusReport, Error>;

    /// Names of every log group matching `pattern`. An empty pattern lists all.
    async fn resolve_log_group(&self, pattern: &str) -> Result<Vec<String>, Error>;
}
