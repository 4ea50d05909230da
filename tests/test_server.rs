use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;

use serde_json::json;

use rust_t_router::config::Config;
use rust_t_router::network::global_network::Network;
use rust_t_router::server::RoutingServer;

/// The 3-node line network used by the protocol scenarios:
/// edge 0: 0 -> 1, length 10, speed limit 10; edge 1: 1 -> 2, length 20,
/// speed limit 10.
fn scenario_network() -> Network {
    let mut network = Network::new(3, 2);
    network.set_node_coordinates(0, 0.0, 0.0);
    network.set_node_coordinates(1, 10.0, 0.0);
    network.set_node_coordinates(2, 30.0, 0.0);
    network.add_edge(0, 0, 1, 10.0, 10.0);
    network.add_edge(1, 1, 2, 20.0, 10.0);
    network.finalize();
    network
}

fn start_server(network: Network) -> SocketAddr {
    let config = Config::builder().port(0).build();
    let server = RoutingServer::bind(network, &config).unwrap();
    let addr = server.local_addr().unwrap();
    thread::spawn(move || server.serve());
    addr
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Client {
            reader,
            writer: stream,
        }
    }

    fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).unwrap();
        self.writer.write_all(b"\n").unwrap();
    }

    fn recv(&mut self) -> String {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).unwrap();
        assert!(read > 0, "server closed the connection unexpectedly");
        line.trim_end_matches(['\n', '\r']).to_string()
    }

    fn request(&mut self, line: &str) -> String {
        self.send(line);
        self.recv()
    }
}

fn assert_well_formed_route2(response: &str) {
    let tokens: Vec<&str> = response.split_whitespace().collect();
    assert_eq!(tokens[0], "ROUTE2", "not a route frame: {response}");
    tokens[1].parse::<f64>().unwrap();

    let node_count: usize = tokens[2].parse().unwrap();
    let edge_count_index = 3 + node_count;
    let edge_count: usize = tokens[edge_count_index].parse().unwrap();

    assert_eq!(node_count, edge_count + 1);
    assert_eq!(tokens.len(), 4 + node_count + edge_count);
    for id in &tokens[3..edge_count_index] {
        id.parse::<u64>().unwrap();
    }
    for id in &tokens[edge_count_index + 1..] {
        id.parse::<u64>().unwrap();
    }
}

#[test]
fn protocol_scenarios_on_the_line_network() {
    let addr = start_server(scenario_network());
    let mut client = Client::connect(addr);

    // initial route uses the synthetic travel times
    assert_eq!(client.request("REQ 0 2"), "ROUTE2 3.000 3 0 1 2 2 0 1");
    // edges are directed, so the reverse direction has no route
    assert_eq!(client.request("REQ 2 0"), "ERR NO_ROUTE");
    // first observation replaces the estimate on edge 0 with 10 / 5 = 2
    assert_eq!(client.request("UPD 0 5"), "ACK");
    assert_eq!(client.request("REQ 0 2"), "ROUTE2 4.000 3 0 1 2 2 0 1");
    assert_eq!(client.request("PRED 0"), "PRED 0 2.000");
    assert_eq!(client.request("UPD 999 10"), "ERR BAD_EDGE");
    assert_eq!(client.request("REQ 0 0"), "ROUTE2 0.000 1 0 0");
}

#[test]
fn domain_errors_leave_the_connection_open() {
    let addr = start_server(scenario_network());
    let mut client = Client::connect(addr);

    assert_eq!(client.request("REQ 0 99"), "ERR BAD_NODES");
    assert_eq!(client.request("REQ -1 1"), "ERR BAD_NODES");
    assert_eq!(client.request("UPD 0 -5"), "ERR BAD_SPEED");
    assert_eq!(client.request("UPD -2 5"), "ERR BAD_EDGE");
    assert_eq!(client.request("PRED 17"), "ERR BAD_EDGE");

    // rejected updates must not have touched the edge state
    assert_eq!(client.request("REQ 0 2"), "ROUTE2 3.000 3 0 1 2 2 0 1");
    assert_eq!(client.request("PRED 0"), "PRED 0 1.000");
}

#[test]
fn malformed_lines_keep_the_connection_usable() {
    let addr = start_server(scenario_network());
    let mut client = Client::connect(addr);

    assert_eq!(client.request(""), "ERR EMPTY");
    assert_eq!(client.request("HELLO"), "ERR UNKNOWN_CMD");
    assert_eq!(client.request("REQ one two"), "ERR UNKNOWN_CMD");
    assert_eq!(client.request("UPD 1"), "ERR UNKNOWN_CMD");
    assert_eq!(client.request("REQ 0 1"), "ROUTE2 1.000 2 0 1 1 0");
}

#[test]
fn responses_follow_request_order_on_one_connection() {
    let addr = start_server(scenario_network());
    let mut client = Client::connect(addr);

    // pipeline a mixed batch; the handler keeps one task in flight at a time
    client
        .writer
        .write_all(b"REQ 0 2\nUPD 0 5\nREQ 0 2\nPRED 0\nREQ 5 5\n")
        .unwrap();

    assert_eq!(client.recv(), "ROUTE2 3.000 3 0 1 2 2 0 1");
    assert_eq!(client.recv(), "ACK");
    assert_eq!(client.recv(), "ROUTE2 4.000 3 0 1 2 2 0 1");
    assert_eq!(client.recv(), "PRED 0 2.000");
    assert_eq!(client.recv(), "ERR BAD_NODES");
}

#[test]
fn prediction_is_idempotent_between_updates() {
    let addr = start_server(scenario_network());
    let mut client = Client::connect(addr);

    assert_eq!(client.request("PRED 1"), "PRED 1 2.000");
    assert_eq!(client.request("PRED 1"), "PRED 1 2.000");

    client.request("UPD 1 8");
    let first = client.request("PRED 1");
    let second = client.request("PRED 1");
    assert_eq!(first, second);
}

#[test]
fn json_framing_mirrors_the_text_protocol() {
    let addr = start_server(scenario_network());
    let mut client = Client::connect(addr);

    let route = client.request(
        r#"{"user_id": 1, "car_id": 4, "start_node": 0, "destination_node": 2, "timestamp": 100}"#,
    );
    let route: serde_json::Value = serde_json::from_str(&route).unwrap();
    assert_eq!(route["route_edges"], json!([0, 1]));
    assert!((route["eta"].as_f64().unwrap() - 3.0).abs() < 1e-9);

    let ack = client.request(
        r#"{"user_id": 1, "car_id": 4, "timestamp": 101, "edge_id": 0, "position_on_edge": 0.5, "speed": 5.0}"#,
    );
    let ack: serde_json::Value = serde_json::from_str(&ack).unwrap();
    assert_eq!(ack["status"], json!("ACK"));

    let no_route = client.request(
        r#"{"user_id": 1, "car_id": 4, "start_node": 2, "destination_node": 0, "timestamp": 102}"#,
    );
    let no_route: serde_json::Value = serde_json::from_str(&no_route).unwrap();
    assert_eq!(no_route["error"], json!("NO_ROUTE"));

    // both framings work on the same connection; the update above is visible
    assert_eq!(client.request("REQ 0 2"), "ROUTE2 4.000 3 0 1 2 2 0 1");
}

#[test]
fn concurrent_mixed_load_stays_well_formed() {
    let addr = start_server(scenario_network());
    let connections = 8;
    let requests_per_connection = 50;

    let workers: Vec<_> = (0..connections)
        .map(|c| {
            thread::spawn(move || {
                let mut client = Client::connect(addr);
                for i in 0..requests_per_connection {
                    match i % 3 {
                        0 => {
                            let response = client.request("REQ 0 2");
                            assert_well_formed_route2(&response);
                        }
                        1 => {
                            // observed speeds stay within the limit of edge 0
                            let speed = 2 + (c + i) % 8;
                            assert_eq!(client.request(&format!("UPD 0 {speed}")), "ACK");
                        }
                        _ => {
                            let response = client.request("PRED 0");
                            assert!(
                                response.starts_with("PRED 0 "),
                                "unexpected response {response}"
                            );
                        }
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    // the server is still healthy afterwards
    let mut client = Client::connect(addr);
    assert_well_formed_route2(&client.request("REQ 0 2"));
}

#[test]
fn abandoned_connection_does_not_disturb_others() {
    let addr = start_server(scenario_network());

    {
        let mut abandoned = Client::connect(addr);
        abandoned.send("REQ 0 2");
        // dropped without reading the response
    }

    let mut client = Client::connect(addr);
    assert_eq!(client.request("REQ 0 2"), "ROUTE2 3.000 3 0 1 2 2 0 1");
    assert_eq!(client.request("PRED 1"), "PRED 1 2.000");
}
