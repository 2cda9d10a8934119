//! xiaoclaw CLI - lightweight conversational agent runtime
//!
//! All CLI logic lives in the `cli` module. This file is just the entry point.

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the real environment still applies.
    dotenvy::dotenv().ok();
    cli::run().await
}
