pub mod config;
pub mod display;
pub mod ensemble;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod models;
pub mod performance;
pub mod service;
