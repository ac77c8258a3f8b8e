pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod scheduler;
pub mod service;
pub mod testkit;
