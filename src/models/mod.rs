pub mod event;
pub mod product;
pub mod release;
pub mod tracking;

// Re-exports for convenience
pub use event::*;
pub use product::*;
pub use release::*;
pub use tracking::*;
