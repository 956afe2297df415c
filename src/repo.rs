use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::id::new_uuid_v7;
use crate::model::{
    NotificationRecord, NotifyBefore, PromptReminder, PushEndpoint, Recurrence, TodoReminder,
};
use crate::time::now_ms;

fn todo_from_row(row: &SqliteRow) -> anyhow::Result<TodoReminder> {
    Ok(TodoReminder {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        notify: row.try_get::<i64, _>("notify")? != 0,
        due_date: row.try_get("due_date")?,
        due_time: row.try_get("due_time")?,
        recurrence: Recurrence::parse(&row.try_get::<String, _>("recurrence")?),
        notify_before: NotifyBefore::parse(&row.try_get::<String, _>("notify_before")?),
        completed: row.try_get::<i64, _>("completed")? != 0,
        notification_sent: row.try_get::<i64, _>("notification_sent")? != 0,
    })
}

/// Tasks that could still produce a reminder. The resolver applies the
/// per-tick predicates; this only filters what can never fire.
pub async fn list_notifiable_todos(pool: &SqlitePool) -> anyhow::Result<Vec<TodoReminder>> {
    let rows = sqlx::query(
        "SELECT id, user_id, title, notify, due_date, due_time, recurrence, \
                notify_before, completed, notification_sent \
         FROM tasks \
         WHERE notify = 1 AND completed = 0 AND due_date IS NOT NULL \
         ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(todo_from_row).collect()
}

/// One-shot tasks record delivery on the entity row itself; there is exactly
/// one occurrence, so no occurrence-keyed marker is needed to gate catch-up.
pub async fn mark_notification_sent(pool: &SqlitePool, id: &str) -> anyhow::Result<()> {
    let res = sqlx::query("UPDATE tasks SET notification_sent = 1, updated_at = ? WHERE id = ?")
        .bind(now_ms())
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        anyhow::bail!("id not found");
    }
    Ok(())
}

fn prompt_from_row(row: &SqliteRow) -> anyhow::Result<PromptReminder> {
    Ok(PromptReminder {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        prompt_time: row.try_get("prompt_time")?,
        notified_on: row.try_get("notified_on")?,
    })
}

pub async fn list_enabled_prompts(pool: &SqlitePool) -> anyhow::Result<Vec<PromptReminder>> {
    let rows = sqlx::query(
        "SELECT id, user_id, prompt_time, notified_on FROM mindset_prompts \
         WHERE enabled = 1 ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(prompt_from_row).collect()
}

pub async fn set_prompt_notified_on(pool: &SqlitePool, id: &str, date: &str) -> anyhow::Result<()> {
    let res =
        sqlx::query("UPDATE mindset_prompts SET notified_on = ?, updated_at = ? WHERE id = ?")
            .bind(date)
            .bind(now_ms())
            .bind(id)
            .execute(pool)
            .await?;
    if res.rows_affected() == 0 {
        anyhow::bail!("id not found");
    }
    Ok(())
}

/// Whether the user already wrote a journal entry for the given date.
pub async fn has_entry_for(pool: &SqlitePool, user_id: &str, date: &str) -> anyhow::Result<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM mindset_entries WHERE user_id = ? AND entry_date = ?")
            .bind(user_id)
            .bind(date)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

pub async fn insert_notification(
    pool: &SqlitePool,
    user_id: &str,
    title: &str,
    body: &str,
) -> anyhow::Result<NotificationRecord> {
    let record = NotificationRecord {
        id: new_uuid_v7(),
        user_id: user_id.to_string(),
        title: title.to_string(),
        body: body.to_string(),
        read: false,
        created_at: now_ms(),
    };
    sqlx::query(
        "INSERT INTO notifications (id, user_id, title, body, read, created_at) \
         VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(&record.id)
    .bind(&record.user_id)
    .bind(&record.title)
    .bind(&record.body)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(record)
}

pub async fn list_notifications(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<NotificationRecord>> {
    let rows = sqlx::query(
        "SELECT id, user_id, title, body, read, created_at FROM notifications \
         WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(NotificationRecord {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                title: row.try_get("title")?,
                body: row.try_get("body")?,
                read: row.try_get::<i64, _>("read")? != 0,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn mark_notification_read(pool: &SqlitePool, id: &str) -> anyhow::Result<()> {
    let res = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        anyhow::bail!("id not found");
    }
    Ok(())
}

/// Register or refresh a push endpoint. Re-registering the same endpoint
/// for the same user refreshes the keys in place.
pub async fn upsert_push_endpoint(
    pool: &SqlitePool,
    user_id: &str,
    endpoint: &str,
    p256dh: &str,
    auth: &str,
) -> anyhow::Result<PushEndpoint> {
    let id = new_uuid_v7();
    let created_at = now_ms();
    sqlx::query(
        "INSERT INTO push_endpoints (id, user_id, endpoint, p256dh, auth, created_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id, endpoint) DO UPDATE SET p256dh = excluded.p256dh, auth = excluded.auth",
    )
    .bind(&id)
    .bind(user_id)
    .bind(endpoint)
    .bind(p256dh)
    .bind(auth)
    .bind(created_at)
    .execute(pool)
    .await?;

    let row = sqlx::query(
        "SELECT id, user_id, endpoint, p256dh, auth, created_at FROM push_endpoints \
         WHERE user_id = ? AND endpoint = ?",
    )
    .bind(user_id)
    .bind(endpoint)
    .fetch_one(pool)
    .await?;
    endpoint_from_row(&row)
}

fn endpoint_from_row(row: &SqliteRow) -> anyhow::Result<PushEndpoint> {
    Ok(PushEndpoint {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        endpoint: row.try_get("endpoint")?,
        p256dh: row.try_get("p256dh")?,
        auth: row.try_get("auth")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn list_push_endpoints(
    pool: &SqlitePool,
    user_id: &str,
) -> anyhow::Result<Vec<PushEndpoint>> {
    let rows = sqlx::query(
        "SELECT id, user_id, endpoint, p256dh, auth, created_at FROM push_endpoints \
         WHERE user_id = ? ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(endpoint_from_row).collect()
}

pub async fn delete_push_endpoint(pool: &SqlitePool, id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM push_endpoints WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
