/*!
 * Process Module
 * Process table, lifecycle, job control and wait/reap
 */

pub mod lifecycle;
pub mod record;
pub mod table;
pub mod types;
pub mod wait;

// Re-export public API
pub use record::{ProcessRecord, Resources, SharedActions};
pub use table::{ProcessTable, TableLimits, WeakProcessTable};
pub use types::*;
pub use wait::{WaitOptions, WaitStatus, WaitTarget, WCONTINUED, WNOHANG, WTHREAD, WUNTRACED};
