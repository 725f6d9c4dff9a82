pub mod config;
pub mod logging;

pub use config::{FlowConfig, FlowKind, LookupConfig, UserConfig};
pub use logging::{init_logging, with_log_tags, JsonLogger, LogSink};
