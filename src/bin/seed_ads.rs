//! Load advertisements into the database.
//!
//! Reads a JSON array of `{title, description, image_url, target_url}`
//! objects from the file given as the first argument (or stdin) and inserts
//! each one. Uses the same `DATABASE_PATH` as the server.

use std::io::Read;

use newstrends::{config::Config, db::Database, db::NewAdvertisement};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newstrends=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let ads: Vec<NewAdvertisement> = serde_json::from_str(&raw)?;
    if let Some(pos) = ads.iter().position(|ad| ad.title.trim().is_empty()) {
        anyhow::bail!("Advertisement #{} has no title", pos + 1);
    }

    let config = Config::from_env()?;
    let db = Database::open(config.database_path.clone()).await?;

    let count = ads.len();
    for ad in ads {
        let id = db.insert_advertisement(ad).await?;
        info!("Inserted advertisement {}", id);
    }
    info!(
        "Seeded {} advertisements into {}",
        count,
        config.database_path.display()
    );
    Ok(())
}
