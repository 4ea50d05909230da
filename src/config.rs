use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[arg(long, default_value = "data/graph.meta")]
    pub meta_file: String,
    #[arg(long, default_value = "data/nodes.csv")]
    pub nodes_file: String,
    #[arg(long, default_value = "data/edges.csv")]
    pub edges_file: String,
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    #[arg(long, default_value_t = 8)]
    pub routing_workers: usize,
    #[arg(long, default_value_t = 2)]
    pub traffic_workers: usize,
    #[arg(long, default_value = "./output")]
    pub output_dir: String,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

pub struct ConfigBuilder {
    meta_file: String,
    nodes_file: String,
    edges_file: String,
    port: u16,
    routing_workers: usize,
    traffic_workers: usize,
    output_dir: String,
}

impl ConfigBuilder {
    fn new() -> Self {
        ConfigBuilder {
            meta_file: String::from("data/graph.meta"),
            nodes_file: String::from("data/nodes.csv"),
            edges_file: String::from("data/edges.csv"),
            port: 8080,
            routing_workers: 8,
            traffic_workers: 2,
            output_dir: String::from("./output"),
        }
    }

    pub fn meta_file(mut self, file: String) -> Self {
        self.meta_file = file;
        self
    }

    pub fn nodes_file(mut self, file: String) -> Self {
        self.nodes_file = file;
        self
    }

    pub fn edges_file(mut self, file: String) -> Self {
        self.edges_file = file;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn routing_workers(mut self, count: usize) -> Self {
        self.routing_workers = count;
        self
    }

    pub fn traffic_workers(mut self, count: usize) -> Self {
        self.traffic_workers = count;
        self
    }

    pub fn output_dir(mut self, dir: String) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn build(self) -> Config {
        Config {
            meta_file: self.meta_file,
            nodes_file: self.nodes_file,
            edges_file: self.edges_file,
            port: self.port,
            routing_workers: self.routing_workers,
            traffic_workers: self.traffic_workers,
            output_dir: self.output_dir,
        }
    }
}
