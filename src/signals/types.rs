/*!
 * Signal Types
 * UNIX-style signal definitions, sets, dispositions and result types
 */

use crate::core::errors::ErrorKind;
use crate::core::types::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Signal operation result
pub type SignalResult<T> = Result<T, SignalError>;

/// Signal errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(u32),

    #[error("Process not found: {0}")]
    ProcessNotFound(Pid),

    #[error("Signal {0} cannot be caught or ignored")]
    Uncatchable(Signal),
}

impl SignalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignalError::InvalidSignal(_) | SignalError::Uncatchable(_) => ErrorKind::InvalidArgument,
            SignalError::ProcessNotFound(_) => ErrorKind::NoSuchProcess,
        }
    }
}

/// UNIX-style signal numbers (Linux numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Signal {
    /// Hangup detected on controlling terminal or death of controlling process
    SIGHUP = 1,
    /// Interrupt from keyboard (Ctrl+C)
    SIGINT = 2,
    /// Quit from keyboard (Ctrl+\)
    SIGQUIT = 3,
    /// Illegal instruction
    SIGILL = 4,
    /// Trace/breakpoint trap
    SIGTRAP = 5,
    /// Abort signal
    SIGABRT = 6,
    /// Bus error (bad memory access)
    SIGBUS = 7,
    /// Floating-point exception
    SIGFPE = 8,
    /// Kill signal (cannot be caught or ignored)
    SIGKILL = 9,
    /// User-defined signal 1
    SIGUSR1 = 10,
    /// Invalid memory reference
    SIGSEGV = 11,
    /// User-defined signal 2
    SIGUSR2 = 12,
    /// Broken pipe
    SIGPIPE = 13,
    /// Timer signal
    SIGALRM = 14,
    /// Termination signal
    SIGTERM = 15,
    /// Stack fault on coprocessor
    SIGSTKFLT = 16,
    /// Child process stopped or terminated
    SIGCHLD = 17,
    /// Continue if stopped
    SIGCONT = 18,
    /// Stop process (cannot be caught or ignored)
    SIGSTOP = 19,
    /// Stop typed at terminal (Ctrl+Z)
    SIGTSTP = 20,
    /// Terminal input for background process
    SIGTTIN = 21,
    /// Terminal output for background process
    SIGTTOU = 22,
    /// Urgent condition on socket
    SIGURG = 23,
    /// CPU time limit exceeded
    SIGXCPU = 24,
    /// File size limit exceeded
    SIGXFSZ = 25,
    /// Virtual alarm clock
    SIGVTALRM = 26,
    /// Profiling timer expired
    SIGPROF = 27,
    /// Window resize signal
    SIGWINCH = 28,
    /// I/O now possible
    SIGIO = 29,
    /// Power failure
    SIGPWR = 30,
    /// Bad system call
    SIGSYS = 31,
}

/// What a signal does when its handler is `Default`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    Terminate,
    /// Terminate and report a core dump
    Core,
    Ignore,
    Stop,
    Continue,
}

const ALL_SIGNALS: [Signal; 31] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGILL,
    Signal::SIGTRAP,
    Signal::SIGABRT,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGKILL,
    Signal::SIGUSR1,
    Signal::SIGSEGV,
    Signal::SIGUSR2,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGSTKFLT,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGSTOP,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGURG,
    Signal::SIGXCPU,
    Signal::SIGXFSZ,
    Signal::SIGVTALRM,
    Signal::SIGPROF,
    Signal::SIGWINCH,
    Signal::SIGIO,
    Signal::SIGPWR,
    Signal::SIGSYS,
];

impl Signal {
    /// Convert from signal number
    pub fn from_number(n: u32) -> SignalResult<Self> {
        if (1..=31).contains(&n) {
            Ok(ALL_SIGNALS[n as usize - 1])
        } else {
            Err(SignalError::InvalidSignal(n))
        }
    }

    /// All signals in ascending order
    pub fn all() -> impl Iterator<Item = Signal> {
        ALL_SIGNALS.into_iter()
    }

    /// Get signal number
    #[inline]
    pub fn number(&self) -> u32 {
        *self as u32
    }

    /// Check if signal can be caught, blocked or ignored
    #[inline]
    pub fn can_catch(&self) -> bool {
        !matches!(self, Signal::SIGKILL | Signal::SIGSTOP)
    }

    /// Job-control stop signals
    #[inline]
    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU
        )
    }

    pub fn default_action(&self) -> DefaultAction {
        match self {
            Signal::SIGCHLD | Signal::SIGURG | Signal::SIGWINCH => DefaultAction::Ignore,
            Signal::SIGCONT => DefaultAction::Continue,
            Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                DefaultAction::Stop
            }
            Signal::SIGQUIT
            | Signal::SIGILL
            | Signal::SIGTRAP
            | Signal::SIGABRT
            | Signal::SIGBUS
            | Signal::SIGFPE
            | Signal::SIGSEGV
            | Signal::SIGXCPU
            | Signal::SIGXFSZ
            | Signal::SIGSYS => DefaultAction::Core,
            _ => DefaultAction::Terminate,
        }
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Signal::SIGHUP => "Hangup",
            Signal::SIGINT => "Interrupt",
            Signal::SIGQUIT => "Quit",
            Signal::SIGILL => "Illegal instruction",
            Signal::SIGTRAP => "Trace/breakpoint trap",
            Signal::SIGABRT => "Aborted",
            Signal::SIGBUS => "Bus error",
            Signal::SIGFPE => "Floating point exception",
            Signal::SIGKILL => "Killed",
            Signal::SIGUSR1 => "User defined signal 1",
            Signal::SIGSEGV => "Segmentation fault",
            Signal::SIGUSR2 => "User defined signal 2",
            Signal::SIGPIPE => "Broken pipe",
            Signal::SIGALRM => "Alarm clock",
            Signal::SIGTERM => "Terminated",
            Signal::SIGSTKFLT => "Stack fault",
            Signal::SIGCHLD => "Child status changed",
            Signal::SIGCONT => "Continued",
            Signal::SIGSTOP => "Stopped (signal)",
            Signal::SIGTSTP => "Stopped",
            Signal::SIGTTIN => "Stopped (tty input)",
            Signal::SIGTTOU => "Stopped (tty output)",
            Signal::SIGURG => "Urgent I/O condition",
            Signal::SIGXCPU => "CPU time limit exceeded",
            Signal::SIGXFSZ => "File size limit exceeded",
            Signal::SIGVTALRM => "Virtual timer expired",
            Signal::SIGPROF => "Profiling timer expired",
            Signal::SIGWINCH => "Window size changed",
            Signal::SIGIO => "I/O possible",
            Signal::SIGPWR => "Power failure",
            Signal::SIGSYS => "Bad system call",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Set of signals, bit `n - 1` for signal `n`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalSet(u64);

impl SignalSet {
    const VALID: u64 = (1 << 31) - 1;

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set from a raw mask; bits outside 1..=31 are dropped
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits & Self::VALID)
    }

    #[inline]
    pub const fn bits(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn of(signals: &[Signal]) -> Self {
        signals.iter().fold(Self::empty(), |set, sig| set.with(*sig))
    }

    #[inline]
    pub const fn contains(&self, sig: Signal) -> bool {
        self.0 & (1 << (sig as u32 - 1)) != 0
    }

    #[inline]
    pub fn insert(&mut self, sig: Signal) {
        self.0 |= 1 << (sig.number() - 1);
    }

    #[inline]
    pub fn remove(&mut self, sig: Signal) {
        self.0 &= !(1 << (sig.number() - 1));
    }

    #[inline]
    #[must_use]
    pub fn with(mut self, sig: Signal) -> Self {
        self.insert(sig);
        self
    }

    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Drop SIGKILL and SIGSTOP, which can never be blocked
    #[inline]
    #[must_use]
    pub fn blockable(mut self) -> Self {
        self.remove(Signal::SIGKILL);
        self.remove(Signal::SIGSTOP);
        self
    }

    /// Lowest-numbered member
    pub fn lowest(&self) -> Option<Signal> {
        if self.0 == 0 {
            return None;
        }
        Signal::from_number(self.0.trailing_zeros() + 1).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Signal> + '_ {
        Signal::all().filter(move |sig| self.contains(*sig))
    }
}

// sigaction flags (Linux values)
pub const SA_NOCLDSTOP: u32 = 0x0000_0001;
pub const SA_NOCLDWAIT: u32 = 0x0000_0002;
pub const SA_SIGINFO: u32 = 0x0000_0004;
pub const SA_RESTART: u32 = 0x1000_0000;
pub const SA_NODEFER: u32 = 0x4000_0000;
pub const SA_RESETHAND: u32 = 0x8000_0000;

/// Handler part of a disposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigHandler {
    #[default]
    Default,
    Ignore,
    /// Guest address of a handler function
    Catch(u64),
}

impl SigHandler {
    /// Decode the raw `sa_handler` value (0 = SIG_DFL, 1 = SIG_IGN)
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => SigHandler::Default,
            1 => SigHandler::Ignore,
            addr => SigHandler::Catch(addr),
        }
    }

    pub fn to_raw(self) -> u64 {
        match self {
            SigHandler::Default => 0,
            SigHandler::Ignore => 1,
            SigHandler::Catch(addr) => addr,
        }
    }
}

/// Signal disposition installed by sigaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SigAction {
    pub handler: SigHandler,
    /// Signals blocked while the handler runs
    pub mask: SignalSet,
    pub flags: u32,
}

impl SigAction {
    pub fn new(handler: SigHandler, mask: SignalSet, flags: u32) -> Self {
        Self {
            handler,
            mask,
            flags,
        }
    }

    #[inline]
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Per thread-group disposition table
#[derive(Debug, Clone, Default)]
pub struct SignalActions {
    actions: [SigAction; 32],
}

impl SignalActions {
    #[inline]
    pub fn get(&self, sig: Signal) -> SigAction {
        self.actions[sig.number() as usize]
    }

    /// Install an action, returning the previous one
    pub fn set(&mut self, sig: Signal, action: SigAction) -> SignalResult<SigAction> {
        if !sig.can_catch() && action.handler != SigHandler::Default {
            return Err(SignalError::Uncatchable(sig));
        }
        let action = SigAction {
            mask: action.mask.blockable(),
            ..action
        };
        Ok(std::mem::replace(&mut self.actions[sig.number() as usize], action))
    }

    /// Whether generating `sig` would be a no-op (explicit or default ignore)
    pub fn is_ignored(&self, sig: Signal) -> bool {
        match self.get(sig).handler {
            SigHandler::Ignore => true,
            SigHandler::Default => sig.default_action() == DefaultAction::Ignore,
            SigHandler::Catch(_) => false,
        }
    }

    /// Back to the default disposition (SA_RESETHAND)
    pub fn reset(&mut self, sig: Signal) {
        self.actions[sig.number() as usize] = SigAction::default();
    }

    /// exec semantics: caught signals revert to default, ignored stay ignored
    pub fn reset_caught(&mut self) {
        for action in self.actions.iter_mut() {
            if matches!(action.handler, SigHandler::Catch(_)) {
                *action = SigAction::default();
            }
        }
    }
}

/// How sigprocmask combines the new set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigmaskHow {
    Block,
    Unblock,
    SetMask,
}

pub const SIG_BLOCK: u32 = 0;
pub const SIG_UNBLOCK: u32 = 1;
pub const SIG_SETMASK: u32 = 2;

impl SigmaskHow {
    pub fn from_raw(how: u32) -> SignalResult<Self> {
        match how {
            SIG_BLOCK => Ok(SigmaskHow::Block),
            SIG_UNBLOCK => Ok(SigmaskHow::Unblock),
            SIG_SETMASK => Ok(SigmaskHow::SetMask),
            other => Err(SignalError::InvalidSignal(other)),
        }
    }
}

/// Handler invocation the CPU emulator must set up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFrame {
    pub signal: Signal,
    pub handler: u64,
    pub flags: u32,
    /// Mask to restore through sigreturn
    pub restore_mask: SignalSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_numbers() {
        for n in 1..=31 {
            assert_eq!(Signal::from_number(n).unwrap().number(), n);
        }
        assert!(Signal::from_number(0).is_err());
        assert!(Signal::from_number(32).is_err());
    }

    #[test]
    fn test_set_operations() {
        let mut set = SignalSet::of(&[Signal::SIGTERM, Signal::SIGHUP]);
        assert!(set.contains(Signal::SIGHUP));
        assert_eq!(set.lowest(), Some(Signal::SIGHUP));
        set.remove(Signal::SIGHUP);
        assert_eq!(set.lowest(), Some(Signal::SIGTERM));
        assert_eq!(set.iter().count(), 1);
    }

    #[test]
    fn test_kill_and_stop_are_not_blockable() {
        let set = SignalSet::from_bits(u64::MAX).blockable();
        assert!(!set.contains(Signal::SIGKILL));
        assert!(!set.contains(Signal::SIGSTOP));
        assert!(set.contains(Signal::SIGINT));
    }

    #[test]
    fn test_actions() {
        let mut actions = SignalActions::default();
        assert!(actions.is_ignored(Signal::SIGCHLD));
        assert!(!actions.is_ignored(Signal::SIGTERM));

        let err = actions.set(Signal::SIGKILL, SigAction::new(SigHandler::Ignore, SignalSet::empty(), 0));
        assert_eq!(err, Err(SignalError::Uncatchable(Signal::SIGKILL)));

        actions
            .set(Signal::SIGUSR1, SigAction::new(SigHandler::Catch(0x4000), SignalSet::empty(), 0))
            .unwrap();
        actions
            .set(Signal::SIGUSR2, SigAction::new(SigHandler::Ignore, SignalSet::empty(), 0))
            .unwrap();
        actions.reset_caught();
        assert_eq!(actions.get(Signal::SIGUSR1).handler, SigHandler::Default);
        assert_eq!(actions.get(Signal::SIGUSR2).handler, SigHandler::Ignore);
    }
}
