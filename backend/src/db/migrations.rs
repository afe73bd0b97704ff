use anyhow::Result;
use sqlx::PgPool;

/// Creates the `tipper_names` and `tip_messages` tables if missing
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Annotation schema is up to date");
    Ok(())
}
