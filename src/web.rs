#![cfg(not(tarpaulin_include))]

use rekap_so::{app, config::Config, logging};

/// Main entry point for the rekap web server
///
/// Reads configuration from the environment (see `Config::from_env`), then serves
/// the API and the static client until the process is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = Config::from_env()?;
    app::run(config).await
}
