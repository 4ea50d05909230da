use clap::Parser;
use tracing::{error, info};

use rust_t_router::config::Config;
use rust_t_router::logging;
use rust_t_router::network;
use rust_t_router::server::{RoutingServer, ServerError};

fn main() {
    let config = Config::parse();
    logging::init_logging(&config.output_dir);
    info!("Logger and Config loaded {config:?}");

    let network = match network::io::load_from_files(
        &config.meta_file,
        &config.nodes_file,
        &config.edges_file,
    ) {
        Ok(network) => network,
        Err(err) => {
            error!("Failed to load network: {err}");
            std::process::exit(1);
        }
    };

    let server = match RoutingServer::bind(network, &config) {
        Ok(server) => server,
        Err(err @ ServerError::Bind(_)) => {
            error!("Failed to start server on port {}: {err}", config.port);
            std::process::exit(2);
        }
        Err(err @ ServerError::WorkerSpawn(_)) => {
            error!("Failed to start server: {err}");
            std::process::exit(3);
        }
    };

    server.serve();
}
