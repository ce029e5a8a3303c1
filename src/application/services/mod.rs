pub mod content_generator;
pub mod job_runner;
pub mod job_service;

pub use content_generator::*;
pub use job_runner::*;
pub use job_service::*;
