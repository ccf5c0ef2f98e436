use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::log_fetcher::{LogService, QueryHandle, QueryRequest, QueryStatus, ResultRow};
use crate::progress::ProgressReporter;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Submitting,
    /// One entry per status check that came back pending.
    Polling,
    Completed,
    Failed,
}

#[derive(Debug)]
pub struct Execution {
    pub log_group: String,
    pub rows: Vec<ResultRow>,
    pub trail: Vec<Phase>,
}

/// Submits a query, polls it to a terminal status and renders the rows.
pub struct QueryExecutor {
    service: Arc<dyn LogService>,
    backoff: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl QueryExecutor {
    pub fn new(service: Arc<dyn LogService>, backoff: BackoffPolicy) -> Self {
        Self {
            service,
            backoff,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Resolves `pattern` to exactly one log group. Several matches are
    /// ambiguous even when one of them is the pattern itself.
    pub async fn resolve_log_group(&self, pattern: &str) -> Result<String> {
        let mut matches = self.service.resolve_log_group(pattern).await?;
        match matches.len() {
            0 => Err(Error::NoLogGroup {
                pattern: pattern.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::AmbiguousLogGroup {
                pattern: pattern.to_string(),
                matches,
            }),
        }
    }

    /// `request.log_group()` is treated as a pattern and resolved first.
    pub async fn run(
        &self,
        request: &QueryRequest,
        progress: &mut dyn ProgressReporter,
    ) -> Result<Execution> {
        let mut trail = vec![Phase::Submitting];
        let log_group = self.resolve_log_group(request.log_group()).await?;
        info!(%log_group, "resolved log group");
        let request = request.for_log_group(log_group.clone());

        let handle = self.service.submit_query(&request).await?;
        debug!(query_id = handle.as_str(), "query submitted");

        let outcome = self.poll(&handle, progress, &mut trail).await;
        progress.clear()?;
        match outcome {
            Ok(rows) => {
                trail.push(Phase::Completed);
                debug!(rows = rows.len(), "query complete");
                Ok(Execution {
                    log_group,
                    rows,
                    trail,
                })
            }
            Err(err) => {
                trail.push(Phase::Failed);
                warn!(query_id = handle.as_str(), ?trail, "query did not complete");
                Err(err)
            }
        }
    }

    async fn poll(
        &self,
        handle: &QueryHandle,
        progress: &mut dyn ProgressReporter,
        trail: &mut Vec<Phase>,
    ) -> Result<Vec<ResultRow>> {
        let mut attempt = 0u32;
        loop {
            let report = self.service.query_status(handle).await?;
            if report.status.is_pending() {
                let wait = self.backoff.wait(attempt);
                debug!(status = %report.status, attempt, ?wait, "query pending");
                trail.push(Phase::Polling);
                progress.update(&report.status.to_string())?;
                self.sleeper.sleep(wait).await;
                attempt += 1;
                continue;
            }
            return match report.status {
                QueryStatus::Complete => Ok(report.rows),
                ended => Err(Error::QueryEnded(ended)),
            };
        }
    }

    /// Runs the query, then opens the output once and encodes into it in a
    /// single pass. Nothing is opened when the query fails.
    pub async fn execute<W, F>(
        &self,
        request: &QueryRequest,
        encoder: &Encoder,
        progress: &mut dyn ProgressReporter,
        open_output: F,
    ) -> Result<Execution>
    where
        W: Write,
        F: FnOnce() -> Result<W>,
    {
        let execution = self.run(request, progress).await?;
        let mut output = open_output()?;
        encoder.encode(&execution.rows, &mut output)?;
        output.flush()?;
        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::OutputFormat;
    use crate::log_fetcher::fake::{build_fake_records, Step};
    use crate::log_fetcher::FakeLogFetcher;
    use crate::progress::testing::{Mark, RecordingProgress};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn waits(&self) -> Vec<Duration> {
            self.waits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    fn request(pattern: &str) -> QueryRequest {
        QueryRequest::new(pattern, "fields @timestamp, @message", 1_700_000_000, 1_700_003_600)
            .unwrap()
    }

    fn executor(
        fetcher: &Arc<FakeLogFetcher>,
        sleeper: &Arc<RecordingSleeper>,
    ) -> QueryExecutor {
        QueryExecutor::new(fetcher.clone(), BackoffPolicy::default()).with_sleeper(sleeper.clone())
    }

    #[tokio::test]
    async fn pending_polls_sleep_on_schedule_then_encode_once() {
        let fetcher = Arc::new(FakeLogFetcher::scripted(
            vec!["/app/api".into()],
            vec![
                Step::Pending(QueryStatus::Running),
                Step::Pending(QueryStatus::Running),
                Step::Complete(build_fake_records(3)),
            ],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut progress = RecordingProgress::default();
        let mut output = Vec::new();
        let sink = &mut output;

        let execution = executor(&fetcher, &sleeper)
            .execute(
                &request("api"),
                &Encoder::new(OutputFormat::Json, false),
                &mut progress,
                move || Ok(sink),
            )
            .await
            .unwrap();

        assert_eq!(
            execution.trail,
            vec![Phase::Submitting, Phase::Polling, Phase::Polling, Phase::Completed]
        );
        let policy = BackoffPolicy::default();
        assert_eq!(sleeper.waits(), vec![policy.wait(0), policy.wait(1)]);
        assert_eq!(fetcher.status_calls(), 3);
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 3);
        assert_eq!(
            progress.marks,
            vec![
                Mark::Update("Running".into()),
                Mark::Update("Running".into()),
                Mark::Clear
            ]
        );
    }

    #[tokio::test]
    async fn resolved_group_name_is_submitted() {
        let fetcher = Arc::new(FakeLogFetcher::scripted(
            vec!["/app/api".into(), "/infra/lb".into()],
            vec![Step::Complete(Vec::new())],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let execution = executor(&fetcher, &sleeper)
            .run(&request("api"), &mut RecordingProgress::default())
            .await
            .unwrap();

        assert_eq!(execution.log_group, "/app/api");
        assert_eq!(fetcher.submitted()[0].log_group(), "/app/api");
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn no_matching_group_never_submits() {
        let fetcher = Arc::new(FakeLogFetcher::scripted(vec!["/app/api".into()], Vec::new()));
        let sleeper = Arc::new(RecordingSleeper::default());
        let err = executor(&fetcher, &sleeper)
            .run(&request("billing"), &mut RecordingProgress::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoLogGroup { .. }));
        assert!(fetcher.submitted().is_empty());
        assert_eq!(fetcher.status_calls(), 0);
    }

    #[tokio::test]
    async fn several_matching_groups_never_submit() {
        let fetcher = Arc::new(FakeLogFetcher::scripted(
            vec!["/app/api".into(), "/app/worker".into()],
            Vec::new(),
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let err = executor(&fetcher, &sleeper)
            .run(&request("/app"), &mut RecordingProgress::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AmbiguousLogGroup { ref matches, .. } if matches.len() == 2));
        assert!(fetcher.submitted().is_empty());
    }

    #[tokio::test]
    async fn exact_name_among_several_matches_is_ambiguous() {
        let fetcher = Arc::new(FakeLogFetcher::scripted(
            vec!["/app/api".into(), "/app/api-v2".into()],
            vec![Step::Complete(Vec::new())],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let err = executor(&fetcher, &sleeper)
            .run(&request("/app/api"), &mut RecordingProgress::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AmbiguousLogGroup { ref matches, .. } if matches.len() == 2));
        assert_eq!(err.exit_code(), 2);
        assert!(fetcher.submitted().is_empty());
        assert_eq!(fetcher.status_calls(), 0);
    }

    #[rstest]
    #[case::failed(QueryStatus::Failed)]
    #[case::cancelled(QueryStatus::Cancelled)]
    #[case::timeout(QueryStatus::Timeout)]
    #[tokio::test]
    async fn terminal_statuses_fail_without_output(#[case] status: QueryStatus) {
        let fetcher = Arc::new(FakeLogFetcher::scripted(
            vec!["/app/api".into()],
            vec![Step::Pending(QueryStatus::Scheduled), Step::Ended(status)],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut progress = RecordingProgress::default();
        let mut opened = false;

        let err = executor(&fetcher, &sleeper)
            .execute(
                &request("api"),
                &Encoder::new(OutputFormat::Json, false),
                &mut progress,
                || {
                    opened = true;
                    Ok(Vec::<u8>::new())
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::QueryEnded(s) if s == status));
        assert!(!opened);
        assert_eq!(fetcher.status_calls(), 2);
        assert_eq!(progress.marks.last(), Some(&Mark::Clear));
    }

    #[tokio::test]
    async fn status_check_error_is_not_retried() {
        let fetcher = Arc::new(FakeLogFetcher::scripted(
            vec!["/app/api".into()],
            vec![
                Step::Unreachable("throttled".into()),
                Step::Complete(Vec::new()),
            ],
        ));
        let sleeper = Arc::new(RecordingSleeper::default());
        let err = executor(&fetcher, &sleeper)
            .run(&request("api"), &mut RecordingProgress::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Remote { .. }));
        assert_eq!(fetcher.status_calls(), 1);
        assert!(sleeper.waits().is_empty());
    }
}
