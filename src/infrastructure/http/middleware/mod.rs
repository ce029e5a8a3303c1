pub mod error;
pub mod worker_auth;

pub use error::*;
pub use worker_auth::*;

use std::sync::Arc;

use crate::application::services::{JobRunner, JobService};

#[derive(Clone)]
pub struct AppState {
    pub job_service: JobService,
    pub runner: Arc<JobRunner>,
    /// Bearer token required on `/worker/*` when set.
    pub cron_secret: Option<String>,
}
