pub mod context;
pub mod scrape_job;

pub use context::AppContext;
pub use scrape_job::{ItemProgress, ItemStatus, JobProgress, JobStatus, ScrapeJobManager};
