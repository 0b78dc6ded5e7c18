//! Crawl configuration: types, defaults, TOML loading, and a builder.

mod builder;
mod types;

pub use builder::CrawlConfigBuilder;
pub use types::CrawlConfig;
