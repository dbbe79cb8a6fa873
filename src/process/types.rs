/*!
 * Process Types
 * Common types for process management
 */

use crate::core::errors::ErrorKind;
use crate::core::serde::{is_false, is_zero_u64};
use crate::core::types::Pid;
use crate::signals::{Signal, SignalSet};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::time::Duration;
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessError {
    #[error("Process not found: {0}")]
    ProcessNotFound(Pid),

    #[error("No child processes")]
    NoChild,

    #[error("Process limit exceeded: current {current}, limit {limit}")]
    ProcessLimitExceeded { current: usize, limit: usize },

    #[error("No free pid below {max_pid}")]
    PidsExhausted { max_pid: Pid },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: Stage, to: Stage },

    #[error("Operation not permitted: {0}")]
    NotPermitted(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Exec format error: {0}")]
    NotExecutable(String),

    #[error("Too many nested interpreters: {0}")]
    InterpreterLoop(String),

    #[error("Thread {0} has terminated")]
    Terminated(Pid),
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::ProcessNotFound(_) | ProcessError::Terminated(_) => ErrorKind::NoSuchProcess,
            ProcessError::NoChild => ErrorKind::NoChild,
            ProcessError::ProcessLimitExceeded { .. } | ProcessError::PidsExhausted { .. } => {
                ErrorKind::ResourceExhausted
            }
            ProcessError::InvalidStateTransition { .. } | ProcessError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            ProcessError::NotPermitted(_) => ErrorKind::NotPermitted,
            ProcessError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ProcessError::NotExecutable(_) => ErrorKind::NotExecutable,
            ProcessError::InterpreterLoop(_) => ErrorKind::SymlinkLoop,
        }
    }
}

/// Lifecycle stage of a process or thread record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Running,
    /// Stopped by a job-control signal
    Stopped,
    /// Terminated, status not yet collected
    Zombie,
    /// Reaped; the record is gone and the pid reusable
    Released,
}

impl Stage {
    /// Allowed lifecycle transitions
    pub fn can_transition_to(self, to: Stage) -> bool {
        matches!(
            (self, to),
            (Stage::Running, Stage::Stopped)
                | (Stage::Stopped, Stage::Running)
                | (Stage::Running, Stage::Zombie)
                | (Stage::Zombie, Stage::Released)
        )
    }
}

/// What a new record shares with its creator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingMode {
    /// Full copy: descriptor table, signal actions and address space
    Fork,
    /// Like fork but the address space is shared and the parent blocks until
    /// the child execs or exits
    Vfork,
    /// New thread in the creator's group sharing everything
    Thread,
}

/// How a process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ExitStatus {
    Exited { code: i32 },
    Signaled { signal: Signal, core: bool },
}

impl ExitStatus {
    #[inline]
    pub fn exited(code: i32) -> Self {
        ExitStatus::Exited { code }
    }

    /// Status of a process killed by `signal`'s default action
    pub fn killed(signal: Signal) -> Self {
        ExitStatus::Signaled {
            signal,
            core: signal.default_action() == crate::signals::DefaultAction::Core,
        }
    }
}

/// CPU time consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTimes {
    pub user: Duration,
    pub system: Duration,
}

impl CpuTimes {
    pub fn new(user: Duration, system: Duration) -> Self {
        Self { user, system }
    }

    /// Clock ticks at 100 Hz, as reported by /proc and times(2)
    pub fn ticks(&self) -> (u64, u64) {
        let to_ticks = |d: Duration| (d.as_millis() / 10) as u64;
        (to_ticks(self.user), to_ticks(self.system))
    }
}

impl Add for CpuTimes {
    type Output = CpuTimes;

    fn add(self, other: CpuTimes) -> CpuTimes {
        CpuTimes {
            user: self.user + other.user,
            system: self.system + other.system,
        }
    }
}

impl AddAssign for CpuTimes {
    fn add_assign(&mut self, other: CpuTimes) {
        *self = *self + other;
    }
}

/// Result of times(2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Times {
    /// Consumed by the calling process (all threads)
    pub own: CpuTimes,
    /// Accumulated from reaped descendants
    pub children: CpuTimes,
}

/// Snapshot of a record for /proc and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub tid: Pid,
    pub pid: Pid,
    pub ppid: Pid,
    pub pgid: Pid,
    pub sid: Pid,
    pub stage: Stage,
    #[serde(skip_serializing_if = "is_false")]
    pub sleeping: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub traced: bool,
    pub name: String,
    pub argv: Vec<String>,
    /// Live threads in the group
    pub threads: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitStatus>,
    pub pending: SignalSet,
    pub blocked: SignalSet,
    pub times: CpuTimes,
    pub child_times: CpuTimes,
    #[serde(skip_serializing_if = "is_zero_u64")]
    pub mapped_bytes: u64,
}

impl ProcessInfo {
    /// State letter used by /proc/<pid>/stat
    pub fn state_char(&self) -> char {
        match self.stage {
            Stage::Running if self.sleeping => 'S',
            Stage::Running => 'R',
            Stage::Stopped if self.traced => 't',
            Stage::Stopped => 'T',
            Stage::Zombie => 'Z',
            Stage::Released => 'X',
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self.state_char() {
            'S' => "sleeping",
            'R' => "running",
            't' => "tracing stop",
            'T' => "stopped",
            'Z' => "zombie",
            _ => "dead",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(Stage::Running.can_transition_to(Stage::Stopped));
        assert!(Stage::Stopped.can_transition_to(Stage::Running));
        assert!(Stage::Zombie.can_transition_to(Stage::Released));
        assert!(!Stage::Zombie.can_transition_to(Stage::Running));
        assert!(!Stage::Running.can_transition_to(Stage::Released));
    }

    #[test]
    fn test_killed_status_reports_core() {
        assert_eq!(
            ExitStatus::killed(Signal::SIGSEGV),
            ExitStatus::Signaled {
                signal: Signal::SIGSEGV,
                core: true
            }
        );
        assert_eq!(
            ExitStatus::killed(Signal::SIGTERM),
            ExitStatus::Signaled {
                signal: Signal::SIGTERM,
                core: false
            }
        );
    }

    #[test]
    fn test_ticks() {
        let times = CpuTimes::new(Duration::from_millis(250), Duration::from_secs(1));
        assert_eq!(times.ticks(), (25, 100));
    }
}
