//! Lot tracker - card production records over SQLite
//!
//! Opens the department database, loads the delivery directory and serves the
//! JSON API the operator screens talk to.

use clap::Parser;
use lot_tracker::database::{init_schema, seed_directory};
use lot_tracker::web;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Card production lot tracking server
#[derive(Parser, Debug)]
#[command(name = "lot_tracker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Port for the JSON API
    #[arg(short, long, default_value_t = 8090)]
    port: u16,
}

/// Returns the default database path: ~/.local/share/lot_tracker/lots.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lot_tracker")
        .join("lots.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting lot_tracker...");
    log::info!("Database path: {}", db_path.display());

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let conn = match Connection::open(&db_path) {
        Ok(conn) => {
            log::info!("Opened database: {}", db_path.display());
            conn
        }
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_schema(&conn) {
        log::error!("Failed to initialize database schema: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = seed_directory(&conn) {
        log::error!("Failed to seed directory data: {}", e);
        std::process::exit(1);
    }

    let db = Arc::new(Mutex::new(conn));

    if let Err(e) = web::serve(db, args.port).await {
        log::error!("API server error: {}", e);
        std::process::exit(1);
    }
}
