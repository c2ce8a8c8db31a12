pub mod analyses;
pub mod fault_tree_edges;
pub mod fault_tree_nodes;
