use tipheat::{utils, get_db_pool};
use tipheat::db::DatabaseConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let db_config = DatabaseConfig::from_env()?;
    let pool = get_db_pool(&db_config).await?;

    println!("Creating tip annotation tables...");
    tipheat::db::migrations::run_migrations(&pool).await?;
    println!("Annotation schema ready!");

    Ok(())
}
