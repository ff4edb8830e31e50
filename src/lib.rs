pub mod classify;
pub mod config;
pub mod dns;
pub mod error;
pub mod http;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod signatures;

pub use config::ScanConfig;
