pub mod apply;
pub mod clean;
pub mod config;
pub mod deploy;
pub mod history;
pub mod plan;
pub mod rollback;
pub mod service;
