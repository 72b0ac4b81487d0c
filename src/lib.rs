// Library exports for drawsphere
// This allows integration tests and the binary to share the modules

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod graph;
pub mod media;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
