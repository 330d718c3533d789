use serde::Serialize;

/// Visualisation view of one cluster: its members and the thresholded edges
/// among them. Assembled from the engine's membership and the sparse
/// matrix by the caller that owns both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Network {
    pub algorithm  : String,
    pub cluster_id : u32,
    pub nodes      : Vec<NetworkNode>,
    pub edges      : Vec<NetworkEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkNode {
    pub guid  : String,
    pub mixed : bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEdge {
    pub source : String,
    pub target : String,
    pub snv    : u32,
}
