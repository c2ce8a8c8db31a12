pub mod analysis_service;
pub mod fault_tree_service;
pub mod validation;

pub use analysis_service::AnalysisService;
pub use fault_tree_service::FaultTreeService;
pub use validation::ValidationService;
