use seoscribe::infrastructure::persistence::Database;
use uuid::Uuid;

pub async fn setup_test_db() -> Database {
    // Use file-based SQLite for tests (unique UUID per test for parallel execution)
    let temp_file = std::env::temp_dir().join(format!("seoscribe_test_{}.db", Uuid::new_v4()));
    let db_url = format!("sqlite://{}?mode=rwc", temp_file.display());

    let db = Database::connect(&db_url)
        .await
        .expect("Failed to connect to test database");

    db.run_migrations()
        .await
        .expect("Failed to run migrations");

    db
}

/// Move a job's timestamps into the past, bypassing the repository.
pub async fn backdate_job(db: &Database, job_id: &str, created_hours: i64, updated_minutes: i64) {
    let now = chrono::Utc::now();
    let created = seoscribe::infrastructure::persistence::format_timestamp(
        now - chrono::Duration::hours(created_hours),
    );
    let updated = seoscribe::infrastructure::persistence::format_timestamp(
        now - chrono::Duration::minutes(updated_minutes),
    );
    sqlx::query("UPDATE jobs SET created_at = ?, updated_at = ? WHERE id = ?")
        .bind(created)
        .bind(updated)
        .bind(job_id)
        .execute(db.pool())
        .await
        .expect("Failed to backdate job");
}
