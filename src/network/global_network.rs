use crate::error::ServiceError;

/// Floor applied to observed speeds before dividing, so a crawling probe
/// cannot produce an infinite travel time.
const MIN_OBSERVED_SPEED: f64 = 1e-6;

/// Smoothing coefficient after the first observation. The first observation
/// uses 1.0 and replaces the synthetic freespeed estimate entirely.
const SMOOTHING: f64 = 0.2;

/// Directed road network. Topology (nodes, adjacency, edge endpoints, length,
/// freespeed) is fixed once loading finishes; only the travel-time fields of
/// each edge change at runtime, which is why the whole value sits behind the
/// server's RwLock.
#[derive(Debug)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    max_freespeed: f64,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub out_edges: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: usize,
    pub from: usize,
    pub to: usize,
    pub length: f64,
    pub freespeed: f64,
    pub travel_time: f64,
    pub ema_travel_time: f64,
    pub observation_count: u64,
}

impl Network {
    pub fn new(num_nodes: usize, num_edges: usize) -> Self {
        let nodes = (0..num_nodes)
            .map(|id| Node {
                id,
                x: 0.0,
                y: 0.0,
                out_edges: Vec::new(),
            })
            .collect();
        Network {
            nodes,
            edges: Vec::with_capacity(num_edges),
            max_freespeed: 0.0,
        }
    }

    pub fn set_node_coordinates(&mut self, node_id: usize, x: f64, y: f64) {
        assert!(
            node_id < self.nodes.len(),
            "node id {} is out of range for a network with {} nodes",
            node_id,
            self.nodes.len()
        );
        self.nodes[node_id].x = x;
        self.nodes[node_id].y = y;
    }

    pub fn add_edge(&mut self, id: usize, from: usize, to: usize, length: f64, freespeed: f64) {
        assert_eq!(
            id,
            self.edges.len(),
            "edge id {} and its slot in the edge vec {} were not the same",
            id,
            self.edges.len()
        );
        assert!(
            from < self.nodes.len() && to < self.nodes.len(),
            "edge {id} references nodes out of range ({from} -> {to})"
        );
        assert!(
            freespeed > 0.0,
            "edge {id} must have a positive speed limit"
        );

        let travel_time = length / freespeed;
        self.edges.push(Edge {
            id,
            from,
            to,
            length,
            freespeed,
            travel_time,
            ema_travel_time: travel_time,
            observation_count: 0,
        });
        self.nodes[from].out_edges.push(id);
    }

    /// Captures the fastest speed limit for the heuristic. Call once, after
    /// the last edge was added.
    pub fn finalize(&mut self) {
        self.max_freespeed = self.edges.iter().map(|e| e.freespeed).fold(0.0, f64::max);
    }

    pub fn edge_weight(&self, edge: usize) -> f64 {
        self.edges[edge].travel_time
    }

    /// Lower bound on the travel time from `from` to `to`: straight-line
    /// distance divided by the fastest speed limit in the network. When no
    /// positive speed limit exists the bound degrades to the raw distance,
    /// which is not admissible in time units.
    pub fn heuristic(&self, from: usize, to: usize) -> f64 {
        let a = &self.nodes[from];
        let b = &self.nodes[to];
        let dx = a.x - b.x;
        let dy = a.y - b.y;
        let straight_dist = (dx * dx + dy * dy).sqrt();

        if self.max_freespeed > 0.0 {
            straight_dist / self.max_freespeed
        } else {
            straight_dist
        }
    }

    /// Folds one speed observation into the edge's exponential moving average
    /// and makes the result the current travel time. Callers must hold the
    /// exclusive lock.
    pub fn apply_observation(&mut self, edge: i64, speed: f64) -> Result<(), ServiceError> {
        let edge = self.checked_edge(edge)?;
        if speed <= 0.0 {
            return Err(ServiceError::BadSpeed);
        }

        let e = &mut self.edges[edge];
        let measured = e.length / speed.max(MIN_OBSERVED_SPEED);
        let alpha = if e.observation_count == 0 {
            1.0
        } else {
            SMOOTHING
        };

        e.ema_travel_time = alpha * measured + (1.0 - alpha) * e.ema_travel_time;
        e.travel_time = e.ema_travel_time;
        e.observation_count += 1;
        Ok(())
    }

    /// Short-term prediction: the smoothed travel time once at least one
    /// observation arrived, the synthetic freespeed estimate before that.
    pub fn predicted_travel_time(&self, edge: i64) -> Result<f64, ServiceError> {
        let edge = self.checked_edge(edge)?;
        let e = &self.edges[edge];
        if e.observation_count > 0 {
            Ok(e.ema_travel_time)
        } else {
            Ok(e.travel_time)
        }
    }

    fn checked_edge(&self, edge: i64) -> Result<usize, ServiceError> {
        if edge < 0 || edge as usize >= self.edges.len() {
            return Err(ServiceError::BadEdge);
        }
        Ok(edge as usize)
    }
}

#[cfg(test)]
mod test {
    use crate::error::ServiceError;
    use crate::network::global_network::Network;

    fn three_node_line() -> Network {
        let mut network = Network::new(3, 2);
        network.set_node_coordinates(0, 0.0, 0.0);
        network.set_node_coordinates(1, 10.0, 0.0);
        network.set_node_coordinates(2, 30.0, 0.0);
        network.add_edge(0, 0, 1, 10.0, 10.0);
        network.add_edge(1, 1, 2, 20.0, 10.0);
        network.finalize();
        network
    }

    #[test]
    fn initial_travel_time_is_length_over_freespeed() {
        let network = three_node_line();
        assert_eq!(network.edge_weight(0), 1.0);
        assert_eq!(network.edge_weight(1), 2.0);
        assert_eq!(network.edges[0].observation_count, 0);
    }

    #[test]
    fn first_observation_replaces_synthetic_estimate() {
        let mut network = three_node_line();
        network.apply_observation(0, 5.0).unwrap();

        // alpha is 1.0 on the first observation, so the EMA equals 10 / 5.
        assert_eq!(network.edges[0].ema_travel_time, 2.0);
        assert_eq!(network.edge_weight(0), 2.0);
        assert_eq!(network.edges[0].observation_count, 1);
    }

    #[test]
    fn ema_converges_towards_constant_observations() {
        let mut network = three_node_line();
        for _ in 0..60 {
            network.apply_observation(1, 4.0).unwrap();
        }
        let expected = 20.0 / 4.0;
        assert!((network.predicted_travel_time(1).unwrap() - expected).abs() < 1e-6);
        assert_eq!(network.edges[1].observation_count, 60);
    }

    #[test]
    fn current_and_ema_travel_time_move_together() {
        let mut network = three_node_line();
        network.apply_observation(0, 5.0).unwrap();
        network.apply_observation(0, 20.0).unwrap();
        assert_eq!(
            network.edges[0].travel_time,
            network.edges[0].ema_travel_time
        );
    }

    #[test]
    fn prediction_before_any_observation_is_the_initial_estimate() {
        let network = three_node_line();
        assert_eq!(network.predicted_travel_time(0).unwrap(), 1.0);
        assert_eq!(network.predicted_travel_time(1).unwrap(), 2.0);
    }

    #[test]
    fn prediction_is_idempotent() {
        let mut network = three_node_line();
        network.apply_observation(0, 7.0).unwrap();
        let first = network.predicted_travel_time(0).unwrap();
        let second = network.predicted_travel_time(0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_observations_do_not_mutate_state() {
        let mut network = three_node_line();

        assert_eq!(
            network.apply_observation(99, 10.0),
            Err(ServiceError::BadEdge)
        );
        assert_eq!(
            network.apply_observation(-1, 10.0),
            Err(ServiceError::BadEdge)
        );
        assert_eq!(
            network.apply_observation(0, 0.0),
            Err(ServiceError::BadSpeed)
        );
        assert_eq!(
            network.apply_observation(0, -3.0),
            Err(ServiceError::BadSpeed)
        );

        assert_eq!(network.edge_weight(0), 1.0);
        assert_eq!(network.edges[0].observation_count, 0);
    }

    #[test]
    fn prediction_rejects_bad_edge_ids() {
        let network = three_node_line();
        assert_eq!(
            network.predicted_travel_time(2),
            Err(ServiceError::BadEdge)
        );
        assert_eq!(
            network.predicted_travel_time(-5),
            Err(ServiceError::BadEdge)
        );
    }

    #[test]
    fn heuristic_uses_fastest_speed_limit() {
        let network = three_node_line();
        // 30 units of straight-line distance at a top speed of 10.
        assert!((network.heuristic(0, 2) - 3.0).abs() < 1e-12);
        assert_eq!(network.heuristic(1, 1), 0.0);
    }
}
