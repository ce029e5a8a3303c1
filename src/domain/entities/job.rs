use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Persisted lifecycle status of a content job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Crawling,
    Generating,
    Parsing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Crawling,
        JobStatus::Generating,
        JobStatus::Parsing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Crawling => "crawling",
            JobStatus::Generating => "generating",
            JobStatus::Parsing => "parsing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "crawling" => Ok(JobStatus::Crawling),
            "generating" => Ok(JobStatus::Generating),
            "parsing" => Ok(JobStatus::Parsing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// The non-terminal statuses. Only these can be written through a plain
/// progress update; terminal states need a result or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveStage {
    Pending,
    Crawling,
    Generating,
    Parsing,
}

impl ActiveStage {
    pub fn status(&self) -> JobStatus {
        match self {
            ActiveStage::Pending => JobStatus::Pending,
            ActiveStage::Crawling => JobStatus::Crawling,
            ActiveStage::Generating => JobStatus::Generating,
            ActiveStage::Parsing => JobStatus::Parsing,
        }
    }
}

impl From<ActiveStage> for JobStatus {
    fn from(stage: ActiveStage) -> Self {
        stage.status()
    }
}

/// Validated, immutable submission data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInput {
    pub url: String,
    pub topic: String,
    pub keywords: Vec<String>,
    pub target_length: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawledPageRef {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub meta_title: String,
    pub meta_description: String,
    pub content_markdown: String,
    pub faq_raw: String,
    pub schema_json: String,
    pub crawled_pages: Vec<CrawledPageRef>,
}

/// Outcome-bearing part of a job. A result exists only when completed and an
/// error only when failed.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    InProgress(ActiveStage),
    Completed(JobResult),
    Failed { error: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::InProgress(stage) => stage.status(),
            JobState::Completed(_) => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub input: JobInput,
    pub state: JobState,
    pub progress: u8,
    pub message: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn result(&self) -> Option<&JobResult> {
        match &self.state {
            JobState::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// How one processing attempt ends. Written only while the attempt still
/// owns the job.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Completed(JobResult),
    /// Back to pending for another attempt.
    Requeued { message: String },
    Failed { error: String },
}

/// Partial write used by `update_job`. Attempts, result and error are never
/// touched through this path.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub stage: Option<ActiveStage>,
    pub progress: Option<u8>,
    pub message: Option<String>,
}

impl JobUpdate {
    pub fn stage(stage: ActiveStage, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage: Some(stage),
            progress: Some(progress),
            message: Some(message.into()),
        }
    }

    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage: None,
            progress: Some(progress),
            message: Some(message.into()),
        }
    }
}

/// Count of jobs per status, for the worker health report.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatusCounts {
    pub pending: i64,
    pub crawling: i64,
    pub generating: i64,
    pub parsing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn set(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Pending => self.pending = count,
            JobStatus::Crawling => self.crawling = count,
            JobStatus::Generating => self.generating = count,
            JobStatus::Parsing => self.parsing = count,
            JobStatus::Completed => self.completed = count,
            JobStatus::Failed => self.failed = count,
        }
    }

    pub fn active(&self) -> i64 {
        self.crawling + self.generating + self.parsing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("processing".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_only_completed_and_failed_are_terminal() {
        let terminal: Vec<_> = JobStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![JobStatus::Completed, JobStatus::Failed]);
    }

    #[test]
    fn test_state_exposes_result_or_error_never_both() {
        let now = Utc::now();
        let mut job = Job {
            id: "j1".to_string(),
            input: JobInput {
                url: "https://example.com".to_string(),
                topic: "Topic".to_string(),
                keywords: vec!["a".to_string()],
                target_length: 800,
            },
            state: JobState::Failed {
                error: "boom".to_string(),
            },
            progress: 30,
            message: "Failed".to_string(),
            attempts: 3,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(job.error(), Some("boom"));
        assert!(job.result().is_none());

        job.state = JobState::InProgress(ActiveStage::Crawling);
        assert!(job.error().is_none());
        assert!(job.result().is_none());
        assert_eq!(job.status(), JobStatus::Crawling);
    }
}
