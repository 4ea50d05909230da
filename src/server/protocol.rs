use itertools::Itertools;
use serde::Deserialize;
use serde_json::json;

use crate::error::ServiceError;
use crate::routing::astar::RouteQueryResult;

/// One parsed client request. Node and edge ids stay signed here so that
/// range validation happens in the workers, under the lock, like every other
/// domain check.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Route { start: i64, dest: i64 },
    Update { edge: i64, speed: f64 },
    Predict { edge: i64 },
}

/// Wire framing a request arrived in. The response to a request is rendered
/// in the same framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Text,
    Json,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    UnknownCmd(Framing),
}

/// Semantic outcome of a task, rendered into a response line by the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Route(RouteQueryResult),
    Ack,
    Predict { edge: i64, travel_time: f64 },
    Error(ServiceError),
}

/// JSON requests used by the simulation clients. Unknown fields (user_id,
/// car_id, timestamp, position_on_edge) are accepted and ignored by the core.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRequest {
    Update { edge_id: i64, speed: f64 },
    Route { start_node: i64, destination_node: i64 },
}

/// Parses one line, already stripped of its CR/LF ending. The framing is
/// sniffed per line: a leading `{` selects JSON, anything else the text
/// commands.
pub fn parse_line(line: &str) -> Result<(Request, Framing), ParseError> {
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    if line.trim_start().starts_with('{') {
        return parse_json(line)
            .map(|request| (request, Framing::Json))
            .ok_or(ParseError::UnknownCmd(Framing::Json));
    }
    parse_text(line)
        .map(|request| (request, Framing::Text))
        .ok_or(ParseError::UnknownCmd(Framing::Text))
}

fn parse_text(line: &str) -> Option<Request> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "REQ" => {
            let start = parts.next()?.parse().ok()?;
            let dest = parts.next()?.parse().ok()?;
            Some(Request::Route { start, dest })
        }
        "UPD" => {
            let edge = parts.next()?.parse().ok()?;
            let speed = parts.next()?.parse().ok()?;
            // optional position on the edge, not used by the core
            if let Some(position) = parts.next() {
                position.parse::<f64>().ok()?;
            }
            Some(Request::Update { edge, speed })
        }
        "PRED" => {
            let edge = parts.next()?.parse().ok()?;
            Some(Request::Predict { edge })
        }
        _ => None,
    }
}

fn parse_json(line: &str) -> Option<Request> {
    match serde_json::from_str(line).ok()? {
        JsonRequest::Route {
            start_node,
            destination_node,
        } => Some(Request::Route {
            start: start_node,
            dest: destination_node,
        }),
        JsonRequest::Update { edge_id, speed } => Some(Request::Update {
            edge: edge_id,
            speed,
        }),
    }
}

/// Renders a response as a single line, without the trailing newline.
pub fn render(response: &Response, framing: Framing) -> String {
    match framing {
        Framing::Text => render_text(response),
        Framing::Json => render_json(response),
    }
}

pub fn render_parse_error(error: &ParseError) -> String {
    match error {
        ParseError::Empty => String::from("ERR EMPTY"),
        ParseError::UnknownCmd(Framing::Text) => String::from("ERR UNKNOWN_CMD"),
        ParseError::UnknownCmd(Framing::Json) => json!({"error": "UNKNOWN_CMD"}).to_string(),
    }
}

fn render_text(response: &Response) -> String {
    match response {
        Response::Route(result) => {
            let mut tokens = vec![
                String::from("ROUTE2"),
                format!("{:.3}", result.travel_time),
                result.nodes.len().to_string(),
            ];
            tokens.extend(result.nodes.iter().map(ToString::to_string));
            tokens.push(result.edges.len().to_string());
            tokens.extend(result.edges.iter().map(ToString::to_string));
            tokens.iter().join(" ")
        }
        Response::Ack => String::from("ACK"),
        Response::Predict { edge, travel_time } => {
            format!("PRED {edge} {travel_time:.3}")
        }
        Response::Error(error) => format!("ERR {error}"),
    }
}

fn render_json(response: &Response) -> String {
    match response {
        Response::Route(result) => json!({
            "route_edges": result.edges,
            "eta": result.travel_time,
        })
        .to_string(),
        Response::Ack => json!({"status": "ACK"}).to_string(),
        Response::Predict { edge, travel_time } => json!({
            "edge_id": edge,
            "eta": travel_time,
        })
        .to_string(),
        Response::Error(error) => json!({"error": error.to_string()}).to_string(),
    }
}
