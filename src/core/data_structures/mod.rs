/*!
 * Data Structures
 *
 * Specialized data structures for kernel operations:
 * - Inline strings for stack-allocated small strings (node and process names)
 */

mod inline_string;

pub use inline_string::InlineString;
