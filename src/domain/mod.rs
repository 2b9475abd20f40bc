pub mod diagnostic_log;
pub mod models;
pub mod settings;
