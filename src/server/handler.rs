use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::ServiceError;
use crate::server::protocol;
use crate::server::protocol::{Request, Response};
use crate::server::task::Task;
use crate::server::ServerState;

/// Serves one connection until EOF or a transport error. At most one task is
/// in flight at any time, so responses leave the socket in request order even
/// though tasks from other connections run in parallel.
pub fn run_connection(state: Arc<ServerState>, stream: TcpStream) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| String::from("unknown"));
    info!("Client connected ({peer})");

    let mut reader = match stream.try_clone() {
        Ok(read_half) => BufReader::new(read_half),
        Err(err) => {
            warn!("Failed to clone stream for {peer}: {err}");
            return;
        }
    };
    let mut writer = stream;

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("Receive error from {peer}: {err}");
                break;
            }
        }

        let trimmed = line.trim_end_matches(['\n', '\r']);
        let (request, framing) = match protocol::parse_line(trimmed) {
            Ok(parsed) => parsed,
            Err(err) => {
                if write_line(&mut writer, &protocol::render_parse_error(&err)).is_err() {
                    break;
                }
                continue;
            }
        };

        let (response_tx, response_rx) = mpsc::channel();
        let queue = match request {
            Request::Update { .. } => &state.traffic_queue,
            Request::Route { .. } | Request::Predict { .. } => &state.routing_queue,
        };
        queue.push(Task {
            request,
            response_tx,
        });

        // rendezvous: the worker sends exactly one response per task
        let response = response_rx
            .recv()
            .unwrap_or(Response::Error(ServiceError::Internal));

        if write_line(&mut writer, &protocol::render(&response, framing)).is_err() {
            break;
        }
    }

    info!("Client disconnected ({peer})");
}

fn write_line(writer: &mut TcpStream, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}
