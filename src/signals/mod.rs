/*!
 * Signals Module
 * UNIX-style signal handling for processes and threads
 */

pub mod delivery;
pub mod types;

// Re-export public API
pub use delivery::Delivery;
pub use types::*;
