//! hcdump - Diagnostic dumps of hosted clusters and their control planes

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod crd;
pub mod dump;
pub mod error;
pub mod process;
