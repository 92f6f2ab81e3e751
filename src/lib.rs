pub mod config;
pub mod document;
pub mod dom;
pub mod engine;
pub mod error;
pub mod export;
pub mod policy;
pub mod service;
pub mod shared;
pub mod workspace;

pub use config::{ConfigError, MillConfig};
pub use document::DocumentRef;
pub use dom::{DomEditOutcome, DomEditor, Selector, SetOp};
pub use engine::ActionInfo;
pub use error::MillError;
pub use export::{ExportArea, ExportFormat, ExportSpec};
pub use service::{DomCleanOutcome, DomSetOutcome, RunOutcome, RunRequest, Service};
pub use workspace::Workspace;
