pub mod config;
pub mod error;
pub mod notify;
pub mod queue;
pub mod repo;
pub mod report;
pub mod status;
pub mod submit;
pub mod types;
