use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub type DbPool = Pool<Postgres>;

pub async fn init_db(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .max_lifetime(Duration::from_secs(30 * 60))
        .idle_timeout(Duration::from_secs(10 * 60))
        .connect(database_url)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS poll_options (
            id SERIAL PRIMARY KEY,
            option_text VARCHAR(255) NOT NULL,
            votes BIGINT NOT NULL DEFAULT 0 CHECK (votes >= 0)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

/// Inserts `options` in order when the table is still empty.
/// Returns the number of rows written.
pub async fn seed_options(pool: &DbPool, options: &[String]) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Serializes concurrent seeders so the emptiness check below stays valid.
    sqlx::query("LOCK TABLE poll_options IN EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM poll_options")
        .fetch_one(&mut *tx)
        .await?;

    if existing > 0 {
        tx.rollback().await?;
        return Ok(0);
    }

    for text in options {
        sqlx::query("INSERT INTO poll_options (option_text) VALUES ($1)")
            .bind(text)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(options.len())
}

pub fn get_pool_stats(pool: &DbPool) -> String {
    let size = pool.size() as usize;
    let num_idle = pool.num_idle();
    format!(
        "Pool stats: size={}, idle={}, in_use={}",
        size,
        num_idle,
        size.saturating_sub(num_idle)
    )
}
