pub mod app;
pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod locator;
pub mod manifest;
pub mod matrix;
pub mod output;
