//! Fastband Core - Shared Types
//!
//! Identity newtypes, enums, the error taxonomy, configuration, the token
//! meter, and the audit contract. All other crates depend on this.

mod audit;
mod config;
mod ctx;
mod enums;
mod error;
mod identity;
mod meter;

// Re-export identity types
pub use identity::*;

// Re-export all enums
pub use enums::*;

// Re-export error types
pub use error::*;

// Re-export config types
pub use config::*;

// Re-export token meter types
pub use meter::*;

// Re-export audit types
pub use audit::*;

// Re-export operation context
pub use ctx::*;
