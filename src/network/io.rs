use std::fs::File;
use std::io::{BufRead, BufReader};

use thiserror::Error;
use tracing::info;

use crate::network::global_network::Network;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("meta file missing or invalid counts (num_nodes={num_nodes:?}, num_edges={num_edges:?})")]
    InvalidCounts {
        num_nodes: Option<i64>,
        num_edges: Option<i64>,
    },
    #[error("{path} is empty")]
    EmptyFile { path: String },
    #[error("bad record in {path}: '{line}'")]
    BadRecord { path: String, line: String },
    #[error("node id {id} out of range in {path}")]
    NodeOutOfRange { id: i64, path: String },
    #[error("edge id {id} out of range in {path}")]
    EdgeOutOfRange { id: i64, path: String },
    #[error("edge {id} is defined twice")]
    DuplicateEdge { id: usize },
    #[error("edge {id} references nodes out of range ({from} -> {to})")]
    BadEndpoints { id: usize, from: i64, to: i64 },
    #[error("edge {id} has a non-positive speed limit")]
    NonPositiveSpeed { id: usize },
    #[error("{path}: expected {expected} records, found {found}")]
    CountMismatch {
        path: String,
        expected: usize,
        found: usize,
    },
}

struct EdgeRecord {
    from: usize,
    to: usize,
    length: f64,
    freespeed: f64,
}

/// Loads a network from the meta/nodes/edges file triple. Any failure is
/// fatal for the caller; the partially built network is dropped.
pub fn load_from_files(
    meta_path: &str,
    nodes_path: &str,
    edges_path: &str,
) -> Result<Network, LoadError> {
    let (num_nodes, num_edges) = read_meta_counts(meta_path)?;
    let mut network = Network::new(num_nodes, num_edges);

    load_nodes(&mut network, nodes_path, num_nodes)?;
    load_edges(&mut network, edges_path, num_nodes, num_edges)?;
    network.finalize();

    info!(
        "Loaded network with {} nodes and {} edges",
        network.nodes.len(),
        network.edges.len()
    );
    Ok(network)
}

/// The meta file holds `num_nodes <n>` and `num_edges <m>` key-value lines.
/// Unknown keys are ignored.
fn read_meta_counts(path: &str) -> Result<(usize, usize), LoadError> {
    let mut num_nodes: Option<i64> = None;
    let mut num_edges: Option<i64> = None;

    for line in read_lines(path)? {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<i64>() else {
            continue;
        };
        match key {
            "num_nodes" => num_nodes = Some(value),
            "num_edges" => num_edges = Some(value),
            _ => {}
        }
    }

    match (num_nodes, num_edges) {
        (Some(n), Some(m)) if n > 0 && m >= 0 => Ok((n as usize, m as usize)),
        _ => Err(LoadError::InvalidCounts {
            num_nodes,
            num_edges,
        }),
    }
}

/// nodes.csv: one header line, then `node_id,x,y` records.
fn load_nodes(network: &mut Network, path: &str, num_nodes: usize) -> Result<(), LoadError> {
    let mut lines = read_lines(path)?.into_iter();
    if lines.next().is_none() {
        return Err(LoadError::EmptyFile {
            path: path.to_string(),
        });
    }

    let mut loaded = 0;
    for line in lines {
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let record = match fields.as_slice() {
            [id, x, y] => (
                id.parse::<i64>().ok(),
                x.parse::<f64>().ok(),
                y.parse::<f64>().ok(),
            ),
            _ => (None, None, None),
        };
        let (Some(id), Some(x), Some(y)) = record else {
            return Err(LoadError::BadRecord {
                path: path.to_string(),
                line,
            });
        };

        if id < 0 || id as usize >= num_nodes {
            return Err(LoadError::NodeOutOfRange {
                id,
                path: path.to_string(),
            });
        }

        network.set_node_coordinates(id as usize, x, y);
        loaded += 1;
    }

    if loaded != num_nodes {
        return Err(LoadError::CountMismatch {
            path: path.to_string(),
            expected: num_nodes,
            found: loaded,
        });
    }
    Ok(())
}

/// edges.csv: one header line, then
/// `edge_id,from_node,to_node,base_length,base_speed_limit` records in any
/// order. Records are slotted by id, then added to the network in id order.
fn load_edges(
    network: &mut Network,
    path: &str,
    num_nodes: usize,
    num_edges: usize,
) -> Result<(), LoadError> {
    let mut lines = read_lines(path)?.into_iter();
    if lines.next().is_none() {
        return Err(LoadError::EmptyFile {
            path: path.to_string(),
        });
    }

    let mut records: Vec<Option<EdgeRecord>> = (0..num_edges).map(|_| None).collect();
    let mut loaded = 0;
    for line in lines {
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let record = match fields.as_slice() {
            [id, from, to, length, freespeed] => (
                id.parse::<i64>().ok(),
                from.parse::<i64>().ok(),
                to.parse::<i64>().ok(),
                length.parse::<f64>().ok(),
                freespeed.parse::<f64>().ok(),
            ),
            _ => (None, None, None, None, None),
        };
        let (Some(id), Some(from), Some(to), Some(length), Some(freespeed)) = record else {
            return Err(LoadError::BadRecord {
                path: path.to_string(),
                line,
            });
        };

        if id < 0 || id as usize >= num_edges {
            return Err(LoadError::EdgeOutOfRange {
                id,
                path: path.to_string(),
            });
        }
        let id = id as usize;
        if records[id].is_some() {
            return Err(LoadError::DuplicateEdge { id });
        }
        if from < 0 || from as usize >= num_nodes || to < 0 || to as usize >= num_nodes {
            return Err(LoadError::BadEndpoints { id, from, to });
        }
        if freespeed <= 0.0 {
            return Err(LoadError::NonPositiveSpeed { id });
        }

        records[id] = Some(EdgeRecord {
            from: from as usize,
            to: to as usize,
            length,
            freespeed,
        });
        loaded += 1;
    }

    if loaded != num_edges {
        return Err(LoadError::CountMismatch {
            path: path.to_string(),
            expected: num_edges,
            found: loaded,
        });
    }

    for (id, record) in records.into_iter().enumerate() {
        // every slot is filled: loaded == num_edges and duplicates were rejected
        let record = record.expect("edge slot left empty after count check");
        network.add_edge(id, record.from, record.to, record.length, record.freespeed);
    }
    Ok(())
}

fn read_lines(path: &str) -> Result<Vec<String>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_string(),
        source,
    })?;
    BufReader::new(file)
        .lines()
        .map(|line| {
            line.map(|l| l.trim_end_matches(['\r', '\n']).to_string())
                .map_err(|source| LoadError::Read {
                    path: path.to_string(),
                    source,
                })
        })
        .collect()
}
