pub mod openai;
pub mod web_crawler;

pub use openai::*;
pub use web_crawler::*;
