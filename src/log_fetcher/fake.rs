use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use super::{LogService, QueryHandle, QueryRequest, QueryStatus, ResultField, ResultRow, StatusReport};
use crate::error::Error;

/// Scripted reply to one status check.
#[derive(Clone, Debug)]
pub enum Step {
    Pending(QueryStatus),
    Complete(Vec<ResultRow>),
    Ended(QueryStatus),
    Unreachable(String),
}

/// In-process log service: serves synthetic rows for `--fake` runs and
/// scripted replies for tests.
pub struct FakeLogFetcher {
    groups: Vec<String>,
    steps: Mutex<VecDeque<Step>>,
    submitted: Mutex<Vec<QueryRequest>>,
    status_calls: Mutex<usize>,
}

impl FakeLogFetcher {
    pub fn new() -> Self {
        Self::scripted(
            vec!["/fake/logbridge".to_string()],
            vec![
                Step::Pending(QueryStatus::Scheduled),
                Step::Pending(QueryStatus::Running),
                Step::Complete(build_fake_records(25)),
            ],
        )
    }

    pub fn scripted(groups: Vec<String>, steps: Vec<Step>) -> Self {
        Self {
            groups,
            steps: Mutex::new(steps.into()),
            submitted: Mutex::new(Vec::new()),
            status_calls: Mutex::new(0),
        }
    }

    #[cfg(test)]
    pub fn submitted(&self) -> Vec<QueryRequest> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn status_calls(&self) -> usize {
        self.status_calls.lock().map(|c| *c).unwrap_or_default()
    }
}

impl Default for FakeLogFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogService for FakeLogFetcher {
    async fn submit_query(&self, request: &QueryRequest) -> Result<QueryHandle, Error> {
        let mut submitted = self.submitted.lock().map_err(|_| poisoned("StartQuery"))?;
        submitted.push(request.clone());
        Ok(QueryHandle::new(format!("fake-query-{}", submitted.len())))
    }

    async fn query_status(&self, _handle: &QueryHandle) -> Result<StatusReport, Error> {
        *self
            .status_calls
            .lock()
            .map_err(|_| poisoned("GetQueryResults"))? += 1;
        let step = self
            .steps
            .lock()
            .map_err(|_| poisoned("GetQueryResults"))?
            .pop_front();
        match step {
            Some(Step::Pending(status)) | Some(Step::Ended(status)) => Ok(StatusReport {
                status,
                rows: Vec::new(),
            }),
            Some(Step::Complete(rows)) => Ok(StatusReport {
                status: QueryStatus::Complete,
                rows,
            }),
            Some(Step::Unreachable(message)) => Err(Error::Remote {
                operation: "GetQueryResults",
                message,
            }),
            None => Err(Error::Remote {
                operation: "GetQueryResults",
                message: "fake service ran out of scripted replies".into(),
            }),
        }
    }

    async fn resolve_log_group(&self, pattern: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .groups
            .iter()
            .filter(|name| name.contains(pattern))
            .cloned()
            .collect())
    }
}

fn poisoned(operation: &'static str) -> Error {
    Error::Remote {
        operation,
        message: "fake service state poisoned".into(),
    }
}

pub fn build_fake_records(count: usize) -> Vec<ResultRow> {
    let levels = ["Verbose", "Debug", "Information", "Warning", "Error", "Fatal"];
    let components = [
        "LogBridge.Auth",
        "LogBridge.Billing",
        "LogBridge.Profile",
        "LogBridge.Reporting",
        "LogBridge.Scheduler",
    ];
    let templates = [
        "Handled {@Request} for {@User} in {Elapsed}ms",
        "Publishing {@Event} to {Destination}",
        "Retry #{RetryCount} for {@Operation} due to {Reason}",
        "Cache miss for {@Resource} in shard {Shard}",
    ];

    (0..count)
        .map(|idx| {
            let component = components[idx % components.len()];
            let level = levels[(idx * 7) % levels.len()];
            let template = templates[(idx * 11) % templates.len()];
            let elapsed = 25 + (idx * 17) % 275;

            // Every fifth row carries plain text to exercise the raw fallback.
            let message = if idx % 5 == 4 {
                format!("{component} {template} (req-{idx:05})")
            } else {
                json!({
                    "@t": synthetic_timestamp(idx),
                    "@mt": template,
                    "@l": level,
                    "Request": {
                        "Id": format!("req-{idx:05}"),
                        "Route": format!("/{}/execute", component.replace('.', "/")),
                        "Elapsed": elapsed,
                    },
                    "Shard": format!("shard-{:02}", (idx * 5) % 32),
                })
                .to_string()
            };

            vec![
                ResultField::new("@timestamp", synthetic_timestamp(idx)),
                ResultField::new("@message", message),
                ResultField::new("@logStream", format!("{}/{:04}", component, idx % 3)),
                ResultField::new("@ptr", format!("CmQKKQolNjM0NTY3ODkwMTIzOi9mYWtlL2xvZ2JyaWRnZRAA{idx:06}")),
            ]
        })
        .collect()
}

fn synthetic_timestamp(idx: usize) -> String {
    let day = 1 + (idx % 28);
    let hour = (idx * 5) % 24;
    let minute = (idx * 7) % 60;
    let second = (idx * 11) % 60;
    let millis = (idx * 37) % 1000;
    format!("2025-03-{day:02} {hour:02}:{minute:02}:{second:02}.{millis:03}")
}
