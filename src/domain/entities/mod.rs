pub mod content;
pub mod crawl;
pub mod job;

pub use content::*;
pub use crawl::*;
pub use job::*;
