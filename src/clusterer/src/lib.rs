pub mod algorithm;
pub use algorithm::{ClusterAlgorithm, MixturePolicy};

pub mod engine;
pub use engine::{ClusterAssignment, ClusterEngine, ClusterError, ClusterSummary};

pub mod network;
pub use network::{Network, NetworkEdge, NetworkNode};
