pub mod browser;
pub mod factory;
pub mod mbasic;

pub use browser::{BrowserOptions, BrowserSource};
pub use factory::open_source;
pub use mbasic::MbasicSource;
