//! Fieldops - school assignment and audit backend

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fieldops::{
    blob::{BlobStore, HttpBlobStore, MemoryBlobStore, UnavailableBlobStore},
    config::Args,
    db::MongoClient,
    server::{self, AppState},
    store::{MemoryStore, MongoStore, Stores},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fieldops={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Fieldops - School Assignments & Audits");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} (db: {})", args.mongodb_uri, args.mongodb_db);
    info!("Business timezone offset: {} min", args.utc_offset_minutes);
    info!(
        "Assignment window: {} days, sync window: {} days",
        args.assignment_window_days, args.sync_window_days
    );
    info!("======================================");

    // Connect to MongoDB (in-memory fallback in dev mode)
    let stores = match connect_mongo(&args).await {
        Ok(store) => {
            info!("MongoDB connected successfully");
            Stores::mongo(store)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                Stores::memory(MemoryStore::new())
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let blobs: Arc<dyn BlobStore> = match (&args.storage_url, args.dev_mode) {
        (Some(url), _) => {
            info!("Blob storage: {}", url);
            Arc::new(HttpBlobStore::new(url))
        }
        (None, true) => {
            warn!("STORAGE_URL not set, keeping audit photos in memory");
            Arc::new(MemoryBlobStore::new())
        }
        (None, false) => {
            warn!("STORAGE_URL not set, photo uploads will be recorded as failed");
            Arc::new(UnavailableBlobStore)
        }
    };

    let state = AppState::new(args, stores, blobs)?;
    server::run(Arc::new(state)).await?;

    Ok(())
}

async fn connect_mongo(args: &Args) -> fieldops::Result<MongoStore> {
    let client = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
    MongoStore::new(&client).await
}
