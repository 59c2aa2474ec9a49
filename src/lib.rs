pub mod capture;
pub mod cli;
pub mod client;
pub mod config;
pub mod expr;
pub mod logging;
pub mod matcher;
pub mod runner;
