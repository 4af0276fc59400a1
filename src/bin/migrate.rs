use anyhow::{Context, Result};
use sto_indexer::bootstrap::init_tracing;
use sto_indexer::repository::Database;

fn main() -> Result<()> {
    init_tracing();
    dotenv::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    println!("Running migrations on database: {database_url}");

    let _db = Database::new(&database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
