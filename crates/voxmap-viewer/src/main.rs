use std::process::exit;
use tokio::time::{interval, MissedTickBehavior};
use voxmap_common::config::{config_path_from_env, load_config, ViewerConfig};
use voxmap_logger::log::{log, set_min_severity};
use voxmap_logger::severity::LogSeverity::{self, Debug, Error, Fatal, Info, Warning};
use voxmap_protocol::markup::StyledSpan;
use voxmap_viewer::{ProjectionOptions, ProjectionPipeline, ViewerConnection, ViewerEvent, WorldView};

/// Chat line as plain text
fn chat_text(spans: &[StyledSpan]) -> String {
    spans.iter().map(|span| span.text.as_str()).collect()
}

#[tokio::main]
async fn main() {
    let config_path = config_path_from_env();
    let config: ViewerConfig = match load_config(config_path.as_deref()) {
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

    let pipeline = ProjectionPipeline::new(
        config.worker_threads,
        config.projection_queue_capacity,
        ProjectionOptions {
            see_through_water: config.see_through_water,
        },
    );
    let mut view = WorldView::from_config(&config);

    let submitter = match pipeline.submitter() {
        Ok(submitter) => submitter,
        Err(e) => {
            log(format!("Projection pipeline unavailable: {}", e), Fatal);
            exit(1);
        }
    };
    let mut connection =
        match ViewerConnection::connect(&config.server_address, config.max_frame_length, submitter).await {
            Ok(connection) => connection,
            Err(e) => {
                log(format!("Can't connect to {}: {}", config.server_address, e), Fatal);
                exit(1);
            }
        };
    log("[Socket: Connection established]".to_owned(), Info);

    let mut ticker = interval(config.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let applied = view.apply(pipeline.drain_results());
                if let Some(texture) = view.frame() {
                    let (width, height) = view.region().dimensions();
                    log(
                        format!(
                            "Texture updated: {} chunks applied, {}x{} texels, {} bytes",
                            applied,
                            width,
                            height,
                            texture.len()
                        ),
                        Debug,
                    );
                }
            }
            event = connection.next_event() => match event {
                Some(ViewerEvent::Hello { client_id }) => {
                    log(format!("Hello: Client ID is {}", client_id), Info)
                }
                Some(ViewerEvent::Chat { spans, important }) => {
                    log(chat_text(&spans), if important { Error } else { Info })
                }
                Some(ViewerEvent::ChunkQueued(coord)) => log(format!("Chunk {} queued", coord), Debug),
                Some(ViewerEvent::Closed { reason }) => {
                    log(format!("[Socket: Connection closed ({})]", reason), Info);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log("Quitting...".to_owned(), Info);
                break;
            }
        }
    }

    connection.close().await;
    // Apply whatever finished after the last tick before exiting
    let applied = view.apply(pipeline.drain_results());
    log(format!("Viewer stopped, {} late chunks applied", applied), Debug);
}
