pub mod jobs;
pub mod worker;

pub async fn health() -> &'static str {
    "OK"
}
