pub mod app;
pub mod config;
pub mod error;
pub mod frontend;
pub mod handlers;
pub mod normalize;
pub mod upstream;
