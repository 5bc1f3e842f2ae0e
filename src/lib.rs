pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod estimate;
pub mod executor;
pub mod fetch;
pub mod fs_util;
pub mod normalize;
pub mod output;
pub mod record;
pub mod report;
pub mod sleeper;
pub mod xpath;
