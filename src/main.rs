use std::process;
use std::sync::Arc;

use external_metrics_bridge::{api, logging, BridgeConfig, Dispatcher};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logger(env!("CARGO_CRATE_NAME")) {
        eprintln!("{}", e);
    }

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if config.default_subscription_id.is_empty() {
        info!("No default subscription configured; queries must pass subscriptionID");
    }

    let dispatcher = Arc::new(Dispatcher::from_config(&config));

    if let Err(e) = api::serve(&config, dispatcher).await {
        error!("{}", e);
        process::exit(1);
    }
}
