//! Happy Thoughts API: standalone binary for posting and liking short messages.
//!
//! Default: http://127.0.0.1:8080/

mod config;
mod db;
mod routes;

use routes::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = config::Config::from_env();

    log::info!("Opening database at: {}", config.db_path);
    let database = Arc::new(db::Db::open(&config.db_path).expect("Failed to open database"));
    match database.count_thoughts() {
        Ok(count) => log::info!("Loaded {} stored thoughts", count),
        Err(e) => log::warn!("{}", e),
    }

    let app = routes::router(Arc::new(AppState { db: database }));

    let addr = config.bind_addr();
    log::info!("Happy Thoughts API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
