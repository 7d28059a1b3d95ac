pub mod apis;
pub mod calendar;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod parser;
pub mod pipeline;
pub mod types;
