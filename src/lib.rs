pub mod config;
pub mod detector;
pub mod extractor;
pub mod models;
pub mod normalizer;
pub mod plugins;
pub mod scheduler;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
