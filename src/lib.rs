pub mod accounts;
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod relative_time;
pub mod source;
