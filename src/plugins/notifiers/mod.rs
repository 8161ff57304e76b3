// Event sink implementations
pub mod discord;
pub mod logger;

pub use discord::DiscordNotifier;
pub use logger::LogNotifier;
