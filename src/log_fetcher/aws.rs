use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types::QueryStatus as SdkQueryStatus;
use aws_sdk_cloudwatchlogs::Client;
use aws_types::region::Region;
use tracing::debug;

use super::{LogService, QueryHandle, QueryRequest, QueryStatus, ResultField, ResultRow, StatusReport};
use crate::error::Error;

#[derive(Clone)]
pub struct AwsLogFetcher {
    client: Client,
}

impl AwsLogFetcher {
    pub async fn connect(
        behavior: BehaviorVersion,
        profile: Option<&str>,
        region: Option<&str>,
    ) -> Self {
        let mut loader = aws_config::defaults(behavior);
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = loader.load().await;
        Self {
            client: Client::new(&config),
        }
    }
}

fn remote(operation: &'static str, err: impl std::error::Error) -> Error {
    Error::Remote {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

/// `DescribeLogGroups` accepts name patterns of up to 512 characters drawn
/// from `[.\-_/#A-Za-z0-9]`.
fn check_group_pattern(pattern: &str) -> Result<(), Error> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | '#');
    if pattern.len() > 512 || !pattern.chars().all(allowed) {
        return Err(Error::InvalidArgument(format!(
            "log group pattern {pattern:?} may only contain letters, digits and . - _ / # (at most 512)"
        )));
    }
    Ok(())
}

fn map_status(status: Option<&SdkQueryStatus>) -> Result<QueryStatus, Error> {
    match status {
        Some(SdkQueryStatus::Scheduled) => Ok(QueryStatus::Scheduled),
        Some(SdkQueryStatus::Running) => Ok(QueryStatus::Running),
        Some(SdkQueryStatus::Complete) => Ok(QueryStatus::Complete),
        Some(SdkQueryStatus::Failed) => Ok(QueryStatus::Failed),
        Some(SdkQueryStatus::Cancelled) => Ok(QueryStatus::Cancelled),
        Some(SdkQueryStatus::Timeout) => Ok(QueryStatus::Timeout),
        Some(other) => Err(Error::Remote {
            operation: "GetQueryResults",
            message: format!("unrecognized query status {:?}", other.as_str()),
        }),
        None => Err(Error::Remote {
            operation: "GetQueryResults",
            message: "response carried no query status".into(),
        }),
    }
}

#[async_trait]
impl LogService for AwsLogFetcher {
    async fn submit_query(&self, request: &QueryRequest) -> Result<QueryHandle, Error> {
        let response = self
            .client
            .start_query()
            .log_group_name(request.log_group())
            .query_string(request.query())
            .start_time(request.start_epoch())
            .end_time(request.end_epoch())
            .send()
            .await
            .map_err(|err| remote("StartQuery", err))?;

        match response.query_id() {
            Some(id) => Ok(QueryHandle::new(id)),
            None => Err(Error::Remote {
                operation: "StartQuery",
                message: "missing query id".into(),
            }),
        }
    }

    async fn query_status(&self, handle: &QueryHandle) -> Result<StatusReport, Error> {
        let response = self
            .client
            .get_query_results()
            .query_id(handle.as_str())
            .send()
            .await
            .map_err(|err| remote("GetQueryResults", err))?;

        let status = map_status(response.status())?;
        let rows = if status == QueryStatus::Complete {
            response
                .results()
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|field| {
                            ResultField::new(
                                field.field().unwrap_or_default(),
                                field.value().unwrap_or_default(),
                            )
                        })
                        .collect::<ResultRow>()
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(StatusReport { status, rows })
    }

    async fn resolve_log_group(&self, pattern: &str) -> Result<Vec<String>, Error> {
        check_group_pattern(pattern)?;
        let pattern = Some(pattern.to_string()).filter(|p| !p.is_empty());
        let mut pages = self
            .client
            .describe_log_groups()
            .set_log_group_name_pattern(pattern)
            .into_paginator()
            .send();

        let mut names = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| remote("DescribeLogGroups", err))?;
            names.extend(
                page.log_groups()
                    .iter()
                    .filter_map(|group| group.log_group_name().map(str::to_string)),
            );
        }
        debug!(count = names.len(), "listed log groups");
        Ok(names)
    }
}
