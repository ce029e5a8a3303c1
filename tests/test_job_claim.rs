//! Claim barrier: concurrent runners never receive the same pending job.

mod helpers;

use helpers::*;
use seoscribe::domain::entities::JobStatus;
use seoscribe::domain::ports::job_repository::JobRepository;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_claim_takes_oldest_pending_first() {
    let db = setup_test_db().await;
    let older = db.create_job(&sample_input()).await.unwrap();
    let newer = db.create_job(&sample_input()).await.unwrap();
    backdate_job(&db, &older, 1, 0).await;

    assert_eq!(db.get_next_pending_job().await.unwrap(), Some(older.clone()));
    assert_eq!(db.get_next_pending_job().await.unwrap(), Some(newer));
    assert_eq!(db.get_next_pending_job().await.unwrap(), None);

    let claimed = db.get_job(&older).await.unwrap().unwrap();
    assert_eq!(claimed.status(), JobStatus::Crawling);
    assert_eq!(claimed.attempts, 0);
}

#[tokio::test]
async fn test_claim_skips_terminal_jobs() {
    let db = setup_test_db().await;
    let id = db.create_job(&sample_input()).await.unwrap();
    db.fail_job(&id, "boom").await.unwrap();

    assert_eq!(db.get_next_pending_job().await.unwrap(), None);
}

#[tokio::test]
async fn test_concurrent_claims_are_exclusive() {
    let db = setup_test_db().await;
    let mut created = HashSet::new();
    for _ in 0..5 {
        created.insert(db.create_job(&sample_input()).await.unwrap());
    }

    let repo: Arc<dyn JobRepository> = Arc::new(db.clone());
    let mut handles = Vec::new();
    for _ in 0..12 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.get_next_pending_job().await.unwrap()
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(id) = handle.await.unwrap() {
            claimed.push(id);
        }
    }

    let unique: HashSet<_> = claimed.iter().cloned().collect();
    assert_eq!(claimed.len(), 5, "every job claimed exactly once");
    assert_eq!(unique, created);
}

#[tokio::test]
async fn test_claim_is_visible_to_the_next_read() {
    let db = setup_test_db().await;
    for _ in 0..20 {
        db.create_job(&sample_input()).await.unwrap();
    }

    for _ in 0..20 {
        let id = db.get_next_pending_job().await.unwrap().expect("pending job");
        let job = db.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Crawling, "claim of {} not visible", id);
    }
    assert_eq!(db.get_next_pending_job().await.unwrap(), None);
}

#[tokio::test]
async fn test_attempt_increment_is_visible_to_the_next_read() {
    let db = setup_test_db().await;
    let id = db.create_job(&sample_input()).await.unwrap();

    for expected in 1..=20u32 {
        let returned = db.increment_job_attempt(&id).await.unwrap();
        assert_eq!(returned, expected);
        let job = db.get_job(&id).await.unwrap().unwrap();
        assert_eq!(job.attempts, returned, "increment to {} not visible", returned);
    }
}
