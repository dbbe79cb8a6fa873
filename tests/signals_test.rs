/*!
 * Signal Tests
 * Generation, masks, dispositions and interrupted waits
 */

use std::time::Duration;

use posix_kernel::core::ErrorKind;
use posix_kernel::signals::{SA_RESETHAND, SIG_BLOCK, SIG_SETMASK};
use posix_kernel::{
    Delivery, ExitStatus, Kernel, Pid, SigAction, SigHandler, Signal, SignalSet, Stage, INIT_PID,
};
use pretty_assertions::assert_eq;
use tokio::time::Instant;

fn catch(kernel: &Kernel, tid: Pid, sig: Signal, handler: u64, flags: u32) {
    kernel
        .sigaction(
            tid,
            sig.number(),
            Some(SigAction::new(SigHandler::Catch(handler), SignalSet::empty(), flags)),
        )
        .unwrap();
}

fn handler_frame(kernel: &Kernel, tid: Pid) -> posix_kernel::signals::HandlerFrame {
    match kernel.deliver_signals(tid).unwrap() {
        Delivery::Handler(frame) => frame,
        other => panic!("expected a handler frame, got {:?}", other),
    }
}

#[test]
fn test_fork_inherits_mask_not_pending() {
    let kernel = Kernel::boot().unwrap();
    let usr1 = SignalSet::of(&[Signal::SIGUSR1]);
    kernel.sigprocmask(INIT_PID, SIG_BLOCK, Some(usr1)).unwrap();
    kernel.kill(INIT_PID, INIT_PID as i32, Signal::SIGUSR1.number()).unwrap();
    assert!(kernel.sigpending(INIT_PID).unwrap().contains(Signal::SIGUSR1));

    let child = kernel.fork(INIT_PID).unwrap();
    let info = kernel.processes().info(child).unwrap();
    assert!(info.pending.is_empty());
    assert_eq!(info.blocked, usr1);
    assert!(kernel.sigpending(child).unwrap().is_empty());
}

#[test]
fn test_handler_frame_and_sigreturn() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    catch(&kernel, child, Signal::SIGUSR2, 0x8000, 0);

    kernel.kill(INIT_PID, child as i32, Signal::SIGUSR2.number()).unwrap();
    let frame = handler_frame(&kernel, child);
    assert_eq!(frame.signal, Signal::SIGUSR2);
    assert_eq!(frame.handler, 0x8000);
    assert!(frame.restore_mask.is_empty());

    // The signal is blocked while its handler runs
    let during = kernel.sigprocmask(child, SIG_BLOCK, None).unwrap();
    assert!(during.contains(Signal::SIGUSR2));

    kernel.sigreturn(child, frame.restore_mask).unwrap();
    assert!(kernel.sigprocmask(child, SIG_BLOCK, None).unwrap().is_empty());
    assert_eq!(kernel.deliver_signals(child).unwrap(), Delivery::None);
}

#[test]
fn test_resethand_restores_default() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    catch(&kernel, child, Signal::SIGINT, 0x9000, SA_RESETHAND);

    kernel.kill(INIT_PID, child as i32, Signal::SIGINT.number()).unwrap();
    handler_frame(&kernel, child);
    let now = kernel.sigaction(child, Signal::SIGINT.number(), None).unwrap();
    assert_eq!(now.handler, SigHandler::Default);
}

#[test]
fn test_kill_and_stop_cannot_be_caught_or_blocked() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();

    for sig in [Signal::SIGKILL, Signal::SIGSTOP] {
        let err = kernel
            .sigaction(
                child,
                sig.number(),
                Some(SigAction::new(SigHandler::Ignore, SignalSet::empty(), 0)),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    let all = SignalSet::from_bits(u64::MAX >> 1);
    kernel.sigprocmask(child, SIG_SETMASK, Some(all)).unwrap();
    let blocked = kernel.sigprocmask(child, SIG_BLOCK, None).unwrap();
    assert!(!blocked.contains(Signal::SIGKILL));
    assert!(!blocked.contains(Signal::SIGSTOP));
    assert!(blocked.contains(Signal::SIGTERM));
}

#[test]
fn test_ignoring_discards_pending() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    kernel
        .sigprocmask(child, SIG_BLOCK, Some(SignalSet::of(&[Signal::SIGHUP])))
        .unwrap();
    kernel.kill(INIT_PID, child as i32, Signal::SIGHUP.number()).unwrap();
    assert!(kernel.sigpending(child).unwrap().contains(Signal::SIGHUP));

    kernel
        .sigaction(
            child,
            Signal::SIGHUP.number(),
            Some(SigAction::new(SigHandler::Ignore, SignalSet::empty(), 0)),
        )
        .unwrap();
    assert!(kernel.sigpending(child).unwrap().is_empty());
}

#[test]
fn test_invalid_numbers_and_targets() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();

    let err = kernel.kill(INIT_PID, child as i32, 64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = kernel.kill(INIT_PID, 31337, Signal::SIGTERM.number()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSuchProcess);
    let err = kernel
        .sigprocmask(child, 7, Some(SignalSet::empty()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // Signal 0 probes for existence only
    kernel.kill(INIT_PID, child as i32, 0).unwrap();
    assert!(kernel.processes().info(child).unwrap().pending.is_empty());
    kernel.tkill(INIT_PID, child, 0).unwrap();
}

#[test]
fn test_broadcast_skips_init_and_caller() {
    let kernel = Kernel::boot().unwrap();
    let sender = kernel.fork(INIT_PID).unwrap();
    let other = kernel.fork(INIT_PID).unwrap();

    kernel.kill(sender, -1, Signal::SIGUSR1.number()).unwrap();
    assert!(kernel.processes().info(other).unwrap().pending.contains(Signal::SIGUSR1));
    assert!(kernel.processes().info(sender).unwrap().pending.is_empty());
    assert!(kernel.processes().info(INIT_PID).unwrap().pending.is_empty());
}

#[test]
fn test_tkill_targets_one_thread() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    let worker = kernel.clone_thread(child).unwrap();

    kernel.tkill(INIT_PID, worker, Signal::SIGUSR1.number()).unwrap();
    assert!(kernel.processes().info(worker).unwrap().pending.contains(Signal::SIGUSR1));
    assert!(kernel.processes().info(child).unwrap().pending.is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_pause_interrupted_by_caught_signal() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    catch(&kernel, child, Signal::SIGUSR1, 0x1000, 0);

    let (paused, sent) = tokio::join!(kernel.pause(child), async {
        kernel.nanosleep(INIT_PID, Duration::from_millis(30)).await?;
        kernel.kill(INIT_PID, child as i32, Signal::SIGUSR1.number())
    });
    sent.unwrap();
    assert_eq!(paused.unwrap_err().kind(), ErrorKind::Interrupted);
    assert_eq!(handler_frame(&kernel, child).signal, Signal::SIGUSR1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_default_terminate_during_pause() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();

    let (paused, sent) = tokio::join!(kernel.pause(child), async {
        kernel.nanosleep(INIT_PID, Duration::from_millis(30)).await?;
        kernel.kill(INIT_PID, child as i32, Signal::SIGTERM.number())
    });
    sent.unwrap();
    assert_eq!(paused.unwrap_err().kind(), ErrorKind::NoSuchProcess);

    let info = kernel.processes().info(child).unwrap();
    assert_eq!(info.stage, Stage::Zombie);
    assert_eq!(info.exit, Some(ExitStatus::killed(Signal::SIGTERM)));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_alarm_interrupts_pause() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    catch(&kernel, child, Signal::SIGALRM, 0x2000, 0);

    assert_eq!(kernel.alarm(child, 5).unwrap(), 0);
    assert_eq!(kernel.alarm(child, 2).unwrap(), 5);

    let started = Instant::now();
    let err = kernel.pause(child).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(handler_frame(&kernel, child).signal, Signal::SIGALRM);

    // Cancelled alarms report nothing left
    assert_eq!(kernel.alarm(child, 0).unwrap(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_sigsuspend_swaps_mask_until_delivery() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    let usr1 = SignalSet::of(&[Signal::SIGUSR1]);
    catch(&kernel, child, Signal::SIGUSR1, 0x3000, 0);
    kernel.sigprocmask(child, SIG_SETMASK, Some(usr1)).unwrap();

    kernel.kill(INIT_PID, child as i32, Signal::SIGUSR1.number()).unwrap();
    assert_eq!(kernel.deliver_signals(child).unwrap(), Delivery::None);

    let err = kernel.sigsuspend(child, SignalSet::empty()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interrupted);

    let frame = handler_frame(&kernel, child);
    assert_eq!(frame.restore_mask, usr1);
    kernel.sigreturn(child, frame.restore_mask).unwrap();
    assert_eq!(kernel.sigprocmask(child, SIG_BLOCK, None).unwrap(), usr1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_nanosleep_runs_to_completion() {
    let kernel = Kernel::boot().unwrap();
    let started = Instant::now();
    kernel
        .nanosleep(INIT_PID, Duration::from_millis(250))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(250));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_stopped_process_parks_until_continued() {
    let kernel = Kernel::boot().unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    kernel.kill(INIT_PID, child as i32, Signal::SIGSTOP.number()).unwrap();

    let (slept, resumed) = tokio::join!(
        kernel.nanosleep(child, Duration::from_millis(10)),
        async {
            kernel.nanosleep(INIT_PID, Duration::from_millis(200)).await?;
            let stage = kernel.processes().stage(child)?;
            kernel.kill(INIT_PID, child as i32, Signal::SIGCONT.number())?;
            Ok::<_, posix_kernel::KernelError>(stage)
        }
    );
    assert_eq!(resumed.unwrap(), Stage::Stopped);
    slept.unwrap();
    assert_eq!(kernel.processes().stage(child).unwrap(), Stage::Running);
}
