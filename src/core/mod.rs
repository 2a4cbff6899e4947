/*!
 * Core Module
 * Fundamental error types and tuning limits
 */

pub mod errors;
pub mod limits;

// Re-export for convenience
pub use errors::*;
