/*!
 * Structured Tracing
 * Subscriber setup and spans for blocking syscalls using the tracing crate
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::types::Pid;

/// Blocking calls running longer than this are reported at warn level
const SLOW_SYSCALL: Duration = Duration::from_millis(500);

static NEXT_TRACE_ID: AtomicU64 = AtomicU64::new(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - KERNEL_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("KERNEL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Span around one blocking syscall, from first attempt to completion
///
/// Counts trips through the scheduler and reports the duration when dropped.
pub struct SyscallSpan {
    span: Span,
    start: Instant,
    syscall: &'static str,
    tid: Pid,
    trace_id: u64,
    suspensions: u64,
}

impl SyscallSpan {
    pub fn new(syscall: &'static str, tid: Pid) -> Self {
        let trace_id = NEXT_TRACE_ID.fetch_add(1, Ordering::Relaxed);
        let span = span!(
            Level::DEBUG,
            "blocking_syscall",
            trace_id,
            syscall,
            tid,
            suspensions = tracing::field::Empty,
            result = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            syscall,
            tid,
            trace_id,
            suspensions: 0,
        }
    }

    #[inline]
    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    #[inline]
    pub fn suspensions(&self) -> u64 {
        self.suspensions
    }

    /// Count one trip through the scheduler
    #[inline]
    pub fn suspended(&mut self) {
        self.suspensions += 1;
    }

    pub fn record_result(&self, success: bool) {
        self.span.record("result", if success { "success" } else { "error" });
    }
}

impl Drop for SyscallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("suspensions", self.suspensions);
        let _entered = self.span.enter();
        if duration > SLOW_SYSCALL {
            warn!(
                trace_id = self.trace_id,
                syscall = self.syscall,
                tid = self.tid,
                duration_ms = duration.as_millis() as u64,
                suspensions = self.suspensions,
                "slow blocking syscall"
            );
        } else {
            debug!(
                trace_id = self.trace_id,
                syscall = self.syscall,
                tid = self.tid,
                duration_us = duration.as_micros() as u64,
                suspensions = self.suspensions,
                "blocking syscall completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_ids_are_unique() {
        let a = SyscallSpan::new("waitpid", 2);
        let mut b = SyscallSpan::new("read", 3);
        b.suspended();
        assert_ne!(a.trace_id(), b.trace_id());
        assert_eq!(b.suspensions(), 1);
    }
}
