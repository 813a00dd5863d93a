pub mod adapter;
pub mod backend;
pub mod config;
pub mod extract;
pub mod parse;
pub mod pipeline;

pub use adapter::{build_request, BackendRequest};
pub use backend::{Backend, DryrunBackend, HttpBackend};
pub use config::EngineConfig;
pub use extract::extract;
pub use parse::parse_json;
pub use pipeline::{TransformOutcome, TransformPipeline};
