use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use pacer_lib::migrate;
use pacer_lib::repo;

async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate::apply_migrations(&pool).await?;
    Ok(pool)
}

#[tokio::test]
async fn history_lists_newest_first_and_respects_the_limit() -> Result<()> {
    let pool = memory_pool().await?;
    for i in 0..5 {
        let record =
            repo::insert_notification(&pool, "u1", &format!("Reminder {i}"), "body").await?;
        // created_at comes from the wall clock; force distinct ordering.
        sqlx::query("UPDATE notifications SET created_at = ? WHERE id = ?")
            .bind(i as i64)
            .bind(&record.id)
            .execute(&pool)
            .await?;
    }
    repo::insert_notification(&pool, "u2", "Someone else", "body").await?;

    let records = repo::list_notifications(&pool, "u1", 3).await?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].title, "Reminder 4");
    assert_eq!(records[2].title, "Reminder 2");
    assert!(records.iter().all(|r| r.user_id == "u1"));
    Ok(())
}

#[tokio::test]
async fn mark_read_flips_the_flag_once() -> Result<()> {
    let pool = memory_pool().await?;
    let record = repo::insert_notification(&pool, "u1", "Reminder", "body").await?;
    assert!(!record.read);

    repo::mark_notification_read(&pool, &record.id).await?;
    let records = repo::list_notifications(&pool, "u1", 10).await?;
    assert!(records[0].read);

    let err = repo::mark_notification_read(&pool, "missing").await;
    assert!(err.is_err());
    Ok(())
}
