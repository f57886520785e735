pub mod anthropic;
pub mod config;
pub mod diagnostics;
pub mod grouping;
pub mod handlers;
pub mod import;
pub mod ingest;
pub mod model;
pub mod retry;
pub mod scheduler;
pub mod sniff;
pub mod store;
pub mod tabular;
pub mod worker;
