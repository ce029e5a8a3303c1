pub mod job_validation;
pub mod section_parser;

pub use job_validation::*;
