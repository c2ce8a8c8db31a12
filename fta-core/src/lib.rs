pub mod command;
pub mod config;
pub mod database;
pub mod errors;
pub mod fault_tree;
pub mod feed;
pub mod reconcile;
pub mod services;
pub mod session;
pub mod store;
pub mod sync;

pub use command::{Command, CommandKind, CommandLog};
pub use config::EditorConfig;
pub use errors::{CoreError, CoreErrorKind, CoreResult, GraphError, GraphResult};
pub use session::{EditSession, PendingSync, SyncReport};
pub use store::OptimisticStore;
