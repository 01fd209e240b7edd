pub mod app;
pub mod config;
pub mod crs;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod outlet;
pub mod output;
pub mod store;
