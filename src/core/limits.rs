/*!
 * System Limits and Constants
 *
 * Centralized location for system-wide limits, thresholds, and magic numbers.
 * Organized by domain for maintainability and discoverability.
 *
 * - Values are grouped by domain (process, fd, vfs, ...)
 * - Linux-compatible values are marked with [LINUX-COMPAT]
 */

use std::time::Duration;

// =============================================================================
// PROCESS LIMITS
// =============================================================================

/// Maximum number of live process/thread records
pub const DEFAULT_MAX_PROCESSES: usize = 4096;

/// Largest pid handed out before the allocator wraps
/// [LINUX-COMPAT] Matches the default /proc/sys/kernel/pid_max
pub const DEFAULT_MAX_PID: u32 = 32768;

/// First pid the allocator considers after wrapping (init keeps 1)
pub const FIRST_USER_PID: u32 = 2;

/// Maximum nested `#!` interpreters followed by execve
/// [LINUX-COMPAT] Matches BINPRM_MAX_RECURSION
pub const MAX_INTERPRETER_DEPTH: usize = 4;

/// Maximum length of a `#!` line
pub const MAX_SHEBANG_LINE: usize = 256;

// =============================================================================
// FILE DESCRIPTOR LIMITS
// =============================================================================

/// Standard file descriptor limit per process
/// [LINUX-COMPAT] Matches the default RLIMIT_NOFILE soft limit
pub const STANDARD_MAX_FILE_DESCRIPTORS: usize = 1024;

/// Default pipe buffer capacity (64KB)
/// [LINUX-COMPAT] Matches Linux default pipe buffer
pub const DEFAULT_PIPE_CAPACITY: usize = 65536;

/// Maximum pipe capacity (1MB)
pub const MAX_PIPE_CAPACITY: usize = 1024 * 1024;

// =============================================================================
// VFS LIMITS
// =============================================================================

/// Symlink expansions allowed during one path resolution
/// [LINUX-COMPAT] Matches MAXSYMLINKS
pub const MAX_SYMLINK_EXPANSIONS: usize = 40;

/// Maximum length of a single path component
/// [LINUX-COMPAT] Matches NAME_MAX
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length of a path
/// [LINUX-COMPAT] Matches PATH_MAX
pub const MAX_PATH_LEN: usize = 4096;

/// Longest process name (comm), excluding the terminator
/// [LINUX-COMPAT] Matches TASK_COMM_LEN - 1
pub const COMM_LEN: usize = 15;

// =============================================================================
// MEMORY MAPPINGS
// =============================================================================

/// Page size for mmap alignment
pub const PAGE_SIZE: u64 = 4096;

/// Lowest address handed out for non-fixed mappings
pub const MMAP_BASE: u64 = 0x1000_0000;

/// Upper bound of the mappable range
pub const MMAP_LIMIT: u64 = 0x7fff_0000_0000;

/// Max memory mappings per process
pub const MAX_MEMORY_MAPPINGS: usize = 65530;

/// Max bytes mapped per address space; mappings are backed eagerly
pub const MAX_MAPPED_BYTES: u64 = 1 << 30;

// =============================================================================
// SCHEDULING
// =============================================================================

/// Length of one cooperative scheduling quantum
/// Each suspension point sleeps this long before re-evaluating its predicate
pub const DEFAULT_SCHEDULER_QUANTUM: Duration = Duration::from_millis(1);
