// src/main.rs
use load_planner::api;
use load_planner::config::AppConfig;
use load_planner::logging;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let env_result = dotenvy::dotenv();
    logging::init();
    if let Err(err) = env_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let settings = app_config.optimizer.settings();
    info!(
        max_utilization = settings.max_utilization,
        allow_unit_splitting = settings.allow_unit_splitting,
        date_grouping_range_days = ?settings.shipping_date_grouping_range_days,
        respect_current_assignments = settings.respect_current_assignments,
        "Load planner starting"
    );

    if let Err(err) = api::start_api_server(app_config.api, app_config.optimizer).await {
        error!("API server terminated with an error: {err}");
        std::process::exit(1);
    }
}
