pub mod app;
pub mod browser;
pub mod cli;
pub mod config;
pub mod domain;
pub mod extraction;
pub mod fallback;
pub mod infrastructure;
pub mod monitor;
pub mod portal;
pub mod search;
pub mod session;
