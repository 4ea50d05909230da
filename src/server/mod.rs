pub mod handler;
pub mod protocol;
pub mod task;

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ServiceError;
use crate::network::global_network::Network;
use crate::routing::astar;
use crate::server::protocol::{Request, Response};
use crate::server::task::TaskQueue;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind: {0}")]
    Bind(io::Error),
    #[error("failed to spawn worker pool: {0}")]
    WorkerSpawn(io::Error),
}

/// State shared between handlers and workers. The RwLock is the single
/// coordinator for all mutable edge fields: routing and prediction take it
/// shared, traffic updates take it exclusive.
pub struct ServerState {
    pub network: RwLock<Network>,
    pub routing_queue: TaskQueue,
    pub traffic_queue: TaskQueue,
}

pub struct RoutingServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl RoutingServer {
    /// Binds the listen socket and spawns both worker pools. Either failure
    /// is fatal; the caller maps them to distinct exit codes.
    pub fn bind(network: Network, config: &Config) -> Result<RoutingServer, ServerError> {
        let listener =
            TcpListener::bind(("0.0.0.0", config.port)).map_err(ServerError::Bind)?;

        let state = Arc::new(ServerState {
            network: RwLock::new(network),
            routing_queue: TaskQueue::new(),
            traffic_queue: TaskQueue::new(),
        });

        for i in 0..config.routing_workers {
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name(format!("routing-worker-{i}"))
                .spawn(move || routing_worker(state))
                .map_err(ServerError::WorkerSpawn)?;
        }
        for i in 0..config.traffic_workers {
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name(format!("traffic-worker-{i}"))
                .spawn(move || traffic_worker(state))
                .map_err(ServerError::WorkerSpawn)?;
        }
        info!(
            "Started {} routing and {} traffic workers",
            config.routing_workers, config.traffic_workers
        );

        Ok(RoutingServer { listener, state })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one handler thread per connection.
    /// Accept and spawn errors affect only the connection at hand.
    pub fn serve(self) {
        info!(
            "Server listening on {}",
            self.local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| String::from("unknown address"))
        );

        for (id, stream) in self.listener.incoming().enumerate() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("Accept failed: {err}");
                    continue;
                }
            };

            let state = Arc::clone(&self.state);
            let spawned = thread::Builder::new()
                .name(format!("handler-{id}"))
                .spawn(move || handler::run_connection(state, stream));
            if let Err(err) = spawned {
                warn!("Failed to spawn connection handler: {err}");
            }
        }
    }
}

/// Drains the routing queue: route and prediction tasks under the shared
/// lock. A panicking task is answered with ERR INTERNAL instead of killing
/// the worker.
fn routing_worker(state: Arc<ServerState>) {
    loop {
        let task = state.routing_queue.pop();
        let response = panic::catch_unwind(AssertUnwindSafe(|| {
            execute_routing_task(&state, &task.request)
        }))
        .unwrap_or_else(|_| {
            error!("Routing worker caught a panic while serving a request");
            Response::Error(ServiceError::Internal)
        });

        // the handler may have hung up already; nothing to do then
        let _ = task.response_tx.send(response);
    }
}

fn traffic_worker(state: Arc<ServerState>) {
    loop {
        let task = state.traffic_queue.pop();
        let response = panic::catch_unwind(AssertUnwindSafe(|| {
            execute_traffic_task(&state, &task.request)
        }))
        .unwrap_or_else(|_| {
            error!("Traffic worker caught a panic while serving a request");
            Response::Error(ServiceError::Internal)
        });

        let _ = task.response_tx.send(response);
    }
}

fn execute_routing_task(state: &ServerState, request: &Request) -> Response {
    // a poisoned lock only means some task panicked earlier; the edge table
    // itself is plain numbers and stays usable
    let network = state
        .network
        .read()
        .unwrap_or_else(PoisonError::into_inner);

    match *request {
        Request::Route { start, dest } => match astar::find_route(&network, start, dest) {
            Ok(result) => Response::Route(result),
            Err(err) => Response::Error(err),
        },
        Request::Predict { edge } => match network.predicted_travel_time(edge) {
            Ok(travel_time) => Response::Predict { edge, travel_time },
            Err(err) => Response::Error(err),
        },
        Request::Update { .. } => Response::Error(ServiceError::Internal),
    }
}

fn execute_traffic_task(state: &ServerState, request: &Request) -> Response {
    let mut network = state
        .network
        .write()
        .unwrap_or_else(PoisonError::into_inner);

    match *request {
        Request::Update { edge, speed } => match network.apply_observation(edge, speed) {
            Ok(()) => Response::Ack,
            Err(err) => Response::Error(err),
        },
        Request::Route { .. } | Request::Predict { .. } => {
            Response::Error(ServiceError::Internal)
        }
    }
}
