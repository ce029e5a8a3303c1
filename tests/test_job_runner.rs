//! Job runner state machine: end-to-end pipeline with fake crawler and LLM,
//! retry bound, stuck recovery and forced processing.

mod helpers;

use async_trait::async_trait;
use helpers::*;
use seoscribe::application::services::RunOutcome;
use seoscribe::domain::entities::{
    ActiveStage, CrawlOptions, CrawlOutput, CrawledPageRef, JobResult, JobStatus, JobUpdate,
};
use seoscribe::domain::ports::job_repository::JobRepository;
use seoscribe::domain::ports::site_crawler::{CrawlError, SiteCrawler};
use seoscribe::infrastructure::persistence::Database;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Crawler that lets a newer run reset and finish the job while the current
/// attempt is still crawling, then fails the current attempt.
struct TakeoverCrawler {
    db: Database,
    job_id: String,
}

#[async_trait]
impl SiteCrawler for TakeoverCrawler {
    async fn crawl(&self, seed_url: &str, _options: &CrawlOptions) -> Result<CrawlOutput, CrawlError> {
        self.db.reset_job(&self.job_id).await.unwrap();
        self.db.increment_job_attempt(&self.job_id).await.unwrap();
        let result = JobResult {
            meta_title: "Newer run".to_string(),
            meta_description: "Finished by the newer run".to_string(),
            content_markdown: "# Newer".to_string(),
            faq_raw: String::new(),
            schema_json: String::new(),
            crawled_pages: vec![CrawledPageRef {
                title: "Home".to_string(),
                url: seed_url.to_string(),
            }],
        };
        self.db.complete_job(&self.job_id, &result).await.unwrap();
        Err(CrawlError::SeedUnreachable(format!("{}: HTTP 503", seed_url)))
    }
}

async fn run_overtaken_attempt(prior_attempts: u32) {
    let db = setup_test_db().await;
    let id = db.create_job(&sample_input()).await.unwrap();
    for _ in 0..prior_attempts {
        db.increment_job_attempt(&id).await.unwrap();
    }
    let crawler = Arc::new(TakeoverCrawler {
        db: db.clone(),
        job_id: id.clone(),
    });
    let runner = build_runner(&db, crawler, FakeLlm::replying(VALID_DRAFT));

    let report = runner.run_once(None).await.unwrap();
    assert!(
        matches!(report.outcome, RunOutcome::Abandoned { ref job_id, .. } if *job_id == id),
        "unexpected outcome {:?}",
        report.outcome
    );

    let job = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.result().unwrap().meta_title, "Newer run");
    assert!(job.error().is_none());
}

#[tokio::test]
async fn test_idle_queue_reports_idle() {
    let db = setup_test_db().await;
    let runner = build_runner(&db, FakeCrawler::ok(), FakeLlm::replying(VALID_DRAFT));

    let report = runner.run_once(None).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Idle);
}

#[tokio::test]
async fn test_job_runs_to_completion() {
    let db = setup_test_db().await;
    let crawler = FakeCrawler::ok();
    let llm = FakeLlm::replying(VALID_DRAFT);
    let runner = build_runner(&db, crawler.clone(), llm.clone());
    let id = db.create_job(&sample_input()).await.unwrap();

    let report = runner.run_once(None).await.unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Completed {
            job_id: id.clone(),
            attempts: 1
        }
    );

    let job = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.attempts, 1);
    let result = job.result().expect("completed job has a result");
    assert_eq!(result.meta_title, "Benefits of X | Example Co");
    assert_eq!(result.meta_description, "Discover the benefits of X for y and z.");
    assert!(result.content_markdown.starts_with("# Benefits of X"));
    assert!(result.faq_raw.starts_with("Q: What is X?"));
    assert!(result.schema_json.contains("FAQPage"));
    assert_eq!(result.crawled_pages.len(), 1);
    assert_eq!(result.crawled_pages[0].url, "https://example.com");
    assert_eq!(crawler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_description_fails_after_three_attempts() {
    let db = setup_test_db().await;
    let runner = build_runner(
        &db,
        FakeCrawler::ok(),
        FakeLlm::replying(DRAFT_WITHOUT_DESCRIPTION),
    );
    let id = db.create_job(&sample_input()).await.unwrap();

    let first = runner.run_once(None).await.unwrap();
    assert!(matches!(first.outcome, RunOutcome::Retrying { attempts: 1, .. }));
    let job = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Pending);
    assert_eq!(job.progress, 0);
    assert_eq!(job.attempts, 1);
    assert!(job.message.contains("Attempt 1/3"));
    assert!(job.message.contains("META_DESCRIPTION"));
    assert!(job.error().is_none());

    let second = runner.run_once(None).await.unwrap();
    assert!(matches!(second.outcome, RunOutcome::Retrying { attempts: 2, .. }));

    let third = runner.run_once(None).await.unwrap();
    assert!(matches!(third.outcome, RunOutcome::Failed { attempts: 3, .. }));

    let job = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    let error = job.error().expect("failed job has an error");
    assert!(error.contains("3 attempts"));
    assert!(job.result().is_none());

    // Nothing left to pick up; the bound holds.
    let fourth = runner.run_once(None).await.unwrap();
    assert_eq!(fourth.outcome, RunOutcome::Idle);
    assert_eq!(db.get_job(&id).await.unwrap().unwrap().attempts, 3);
}

#[tokio::test]
async fn test_crawl_failure_is_retried_with_category() {
    let db = setup_test_db().await;
    let llm = FakeLlm::replying(VALID_DRAFT);
    let runner = build_runner(&db, FakeCrawler::unreachable(), llm.clone());
    let id = db.create_job(&sample_input()).await.unwrap();

    let report = runner.run_once(None).await.unwrap();
    match report.outcome {
        RunOutcome::Retrying { job_id, error, .. } => {
            assert_eq!(job_id, id);
            assert!(error.contains("Seed page unreachable"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stalled_final_attempt_is_failed_without_another_increment() {
    let db = setup_test_db().await;
    let runner = build_runner(&db, FakeCrawler::ok(), FakeLlm::replying(VALID_DRAFT));
    let id = db.create_job(&sample_input()).await.unwrap();

    // Three attempts already started, the last one stalled mid-generation.
    for _ in 0..3 {
        db.increment_job_attempt(&id).await.unwrap();
    }
    db.update_job(&id, JobUpdate::stage(ActiveStage::Generating, 40, "Generating content"))
        .await
        .unwrap();
    backdate_job(&db, &id, 1, 15).await;

    let report = runner.run_once(None).await.unwrap();
    assert_eq!(report.maintenance.reset_stuck, 1);
    assert!(matches!(report.outcome, RunOutcome::Failed { attempts: 3, .. }));

    let job = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.attempts, 3);
}

#[tokio::test]
async fn test_maintenance_deletes_expired_jobs() {
    let db = setup_test_db().await;
    let runner = build_runner(&db, FakeCrawler::ok(), FakeLlm::replying(VALID_DRAFT));
    let id = db.create_job(&sample_input()).await.unwrap();
    db.fail_job(&id, "boom").await.unwrap();
    backdate_job(&db, &id, 25, 60 * 25).await;

    let report = runner.run_once(None).await.unwrap();
    assert_eq!(report.maintenance.deleted_old, 1);
    assert!(db.get_job(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_forced_unknown_job_is_not_found() {
    let db = setup_test_db().await;
    let runner = build_runner(&db, FakeCrawler::ok(), FakeLlm::replying(VALID_DRAFT));

    let report = runner.run_once(Some("does-not-exist")).await.unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::NotFound {
            job_id: "does-not-exist".to_string()
        }
    );
}

#[tokio::test]
async fn test_forced_job_skips_queue_order() {
    let db = setup_test_db().await;
    let runner = build_runner(&db, FakeCrawler::ok(), FakeLlm::replying(VALID_DRAFT));
    let older = db.create_job(&sample_input()).await.unwrap();
    let target = db.create_job(&sample_input()).await.unwrap();
    backdate_job(&db, &older, 1, 0).await;

    let report = runner.run_once(Some(&target)).await.unwrap();
    assert!(matches!(report.outcome, RunOutcome::Completed { .. }));

    let older_job = db.get_job(&older).await.unwrap().unwrap();
    assert_eq!(older_job.status(), JobStatus::Pending);
    assert_eq!(older_job.attempts, 0);
}

#[tokio::test]
async fn test_forced_failed_job_restarts_from_first_attempt() {
    let db = setup_test_db().await;
    let runner = build_runner(&db, FakeCrawler::ok(), FakeLlm::replying(VALID_DRAFT));
    let id = db.create_job(&sample_input()).await.unwrap();
    for _ in 0..3 {
        db.increment_job_attempt(&id).await.unwrap();
    }
    db.fail_job(&id, "Failed after 3 attempts: boom").await.unwrap();

    let report = runner.run_once(Some(&id)).await.unwrap();
    assert_eq!(
        report.outcome,
        RunOutcome::Completed {
            job_id: id.clone(),
            attempts: 1
        }
    );
    let job = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
    assert!(job.error().is_none());
}

#[tokio::test]
async fn test_overtaken_final_attempt_does_not_fail_completed_job() {
    run_overtaken_attempt(2).await;
}

#[tokio::test]
async fn test_overtaken_attempt_does_not_requeue_completed_job() {
    run_overtaken_attempt(0).await;
}
