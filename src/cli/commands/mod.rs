//! CLI command implementations.

mod ask;
mod chat;
mod config;
mod doctor;
mod eval;
mod ingest;
mod list;
mod search;

pub use ask::run_ask;
pub use chat::run_chat;
pub use config::run_config;
pub use doctor::run_doctor;
pub use eval::run_eval;
pub use ingest::run_ingest;
pub use list::run_list;
pub use search::run_search;
