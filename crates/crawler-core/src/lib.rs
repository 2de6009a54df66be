pub mod config;
pub mod error;
pub mod types;
pub mod validator;

pub use config::Config;
pub use error::CrawlerError;
pub use types::*;
pub use validator::UrlValidator;
