use std::process::exit;
use voxmap_common::config::{config_path_from_env, load_config, ServerConfig};
use voxmap_logger::log::{log, set_min_severity};
use voxmap_logger::severity::LogSeverity::{self, Fatal, Info, Warning};
use voxmap_server::server;

#[tokio::main]
async fn main() {
    let config_path = config_path_from_env();
    let config: ServerConfig = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log(format!("Can't load config: {}", e), Fatal);
            exit(1);
        }
    };

    match config.log_level.parse::<LogSeverity>() {
        Ok(level) => {
            set_min_severity(level);
        }
        Err(_) => log(format!("Unknown log level \"{}\"", config.log_level), Warning),
    }

    log("voxmap init".to_owned(), Info);
    if let Err(e) = server::run(config).await {
        log(format!("Server stopped: {}", e), Fatal);
        exit(1);
    }
}
