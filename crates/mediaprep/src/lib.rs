pub mod apply;
pub mod broker;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod protocol;
pub mod service;
pub mod worker;

pub use apply::{NoopSearchIndex, ResultApplier, SearchIndex};
pub use config::{load_settings, Settings};
pub use db::Database;
pub use error::{ConfigError, MediaprepError, Result};
pub use inspect::{InspectionOutcome, Inspector, MediaInspector};
pub use protocol::{ResultPayload, WorkAssignment, WorkReply};
pub use service::PipelineService;
