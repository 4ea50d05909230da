use crate::error::ServiceError;
use crate::network::global_network::Network;
use crate::routing::min_heap::IndexedMinHeap;

const NO_PARENT: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteQueryResult {
    pub travel_time: f64,
    pub nodes: Vec<usize>,
    pub edges: Vec<usize>,
}

/// A* over the current edge travel times. The caller must hold the network
/// lock (shared mode) for the whole call so the weights form one consistent
/// snapshot.
pub fn find_route(
    network: &Network,
    start: i64,
    dest: i64,
) -> Result<RouteQueryResult, ServiceError> {
    let start = checked_node(network, start)?;
    let dest = checked_node(network, dest)?;

    let num_nodes = network.nodes.len();
    let mut g_score = vec![f64::INFINITY; num_nodes];
    let mut parent = vec![NO_PARENT; num_nodes];
    let mut queue = IndexedMinHeap::new(num_nodes);

    g_score[start] = 0.0;
    queue.insert(start, network.heuristic(start, dest));

    let mut found = false;
    while let Some((u, _)) = queue.extract_min() {
        if u == dest {
            found = true;
            break;
        }

        for &edge_id in &network.nodes[u].out_edges {
            let edge = &network.edges[edge_id];
            let v = edge.to;
            let tentative_g = g_score[u] + network.edge_weight(edge_id);

            if tentative_g < g_score[v] {
                g_score[v] = tentative_g;
                parent[v] = u;
                let f_score = tentative_g + network.heuristic(v, dest);
                if queue.contains(v) {
                    queue.decrease_key(v, f_score);
                } else {
                    queue.insert(v, f_score);
                }
            }
        }
    }

    if !found {
        return Err(ServiceError::NoRoute);
    }

    let nodes = reconstruct_node_path(&parent, start, dest);
    let edges = resolve_edge_path(network, &nodes)?;

    Ok(RouteQueryResult {
        travel_time: g_score[dest],
        nodes,
        edges,
    })
}

fn checked_node(network: &Network, id: i64) -> Result<usize, ServiceError> {
    if id < 0 || id as usize >= network.nodes.len() {
        return Err(ServiceError::BadNodes);
    }
    Ok(id as usize)
}

fn reconstruct_node_path(parent: &[usize], start: usize, dest: usize) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = dest;
    loop {
        path.push(current);
        if current == start {
            break;
        }
        current = parent[current];
    }
    path.reverse();
    path
}

/// Resolves each consecutive node pair to the connecting edge id by scanning
/// the first node's adjacency list. A pair without an edge means the parent
/// array and the topology disagree, which is an internal failure.
fn resolve_edge_path(network: &Network, nodes: &[usize]) -> Result<Vec<usize>, ServiceError> {
    let mut edges = Vec::with_capacity(nodes.len().saturating_sub(1));
    for pair in nodes.windows(2) {
        let edge_id = network.nodes[pair[0]]
            .out_edges
            .iter()
            .copied()
            .find(|&e| network.edges[e].to == pair[1])
            .ok_or(ServiceError::RouteFail)?;
        edges.push(edge_id);
    }
    Ok(edges)
}
