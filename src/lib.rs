pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod observability;
pub mod regions;
pub mod store;
pub mod zones;
