mod cli;
mod demo;
pub mod infra;
pub mod routes;
mod server;

use thesis_portal::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
