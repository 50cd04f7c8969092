pub mod config;
pub mod encoding;
pub mod linalg;
pub mod reservoir;
pub mod training;
