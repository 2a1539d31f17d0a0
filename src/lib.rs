pub mod advisor;
pub mod apply;
pub mod catalog;
pub mod config;
pub mod ddl;
pub mod error;
pub mod monitoring;
pub mod query_log;
pub mod query_parser;
pub mod suggestion;
pub mod types;
