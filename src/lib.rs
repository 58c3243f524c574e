pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod library;
pub mod models;
pub mod scheduler;

pub use error::{AppError, Result};
