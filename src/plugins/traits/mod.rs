pub mod notifier;

pub use notifier::{EventSink, NotificationResult};
