pub mod analytics;
#[cfg(feature = "remote")]
pub mod client;
pub mod commands;
pub mod config;
pub mod editor;
pub mod error;
pub mod expenses;
pub mod migrate;
pub mod report;
pub mod rest;
pub mod storage;
