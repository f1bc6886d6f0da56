pub mod api;
pub mod clients;
pub mod clock;
pub mod config;
pub mod models;
pub mod queue;
pub mod utils;
