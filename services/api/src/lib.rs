mod cli;
mod infra;
mod routes;
mod server;

use listing_ingest::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
