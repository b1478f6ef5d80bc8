use crate::db::connection::DbPool;
use crate::db::models::PollOption;
use sqlx::Error;

pub async fn get_poll_options(pool: &DbPool) -> Result<Vec<PollOption>, Error> {
    let rows = sqlx::query_as::<_, PollOption>(
        "SELECT id, option_text, votes FROM poll_options ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Adds one vote to `option_id` in a single statement.
/// Returns `false` when no such option exists.
pub async fn increment_votes(pool: &DbPool, option_id: i32) -> Result<bool, Error> {
    let result = sqlx::query("UPDATE poll_options SET votes = votes + 1 WHERE id = $1")
        .bind(option_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn ping(pool: &DbPool) -> Result<(), Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
