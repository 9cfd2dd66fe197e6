pub mod aggregate;
pub mod app;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod frontend;
pub mod output;
pub mod render;
pub mod store;
pub mod taxonomy;
