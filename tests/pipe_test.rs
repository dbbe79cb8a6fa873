/*!
 * Pipe Tests
 * Pipes and socket pairs between logical processes
 */

use std::time::Duration;

use posix_kernel::core::ErrorKind;
use posix_kernel::fd::FIONREAD;
use posix_kernel::vfs::types::open_flags::{O_CLOEXEC, O_CREAT, O_NONBLOCK};
use posix_kernel::{Delivery, Errno, FileType, Kernel, KernelConfig, Signal, INIT_PID};
use pretty_assertions::assert_eq;

fn small_pipes(capacity: usize) -> Kernel {
    let config = KernelConfig {
        pipe_capacity: capacity,
        ..KernelConfig::default()
    };
    Kernel::builder().with_config(config).build().unwrap()
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_pipe_write_read() {
    let kernel = Kernel::boot().unwrap();
    let (r, w) = kernel.pipe(INIT_PID, 0).unwrap();
    assert_eq!((r, w), (0, 1));

    let data = b"Hello through pipe!";
    assert_eq!(kernel.write(INIT_PID, w, data).await.unwrap(), data.len());
    assert_eq!(kernel.ioctl(INIT_PID, r, FIONREAD, 0).unwrap(), data.len() as i64);

    let mut buf = [0u8; 64];
    let n = kernel.read(INIT_PID, r, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], data);

    let meta = kernel.fstat(INIT_PID, r).unwrap();
    assert_eq!(meta.file_type, FileType::Fifo);
    assert_eq!(kernel.lseek(INIT_PID, r, 0, 0).unwrap_err().kind(), ErrorKind::NotSeekable);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_blocking_read_waits_for_writer() {
    let kernel = Kernel::boot().unwrap();
    let (r, w) = kernel.pipe(INIT_PID, 0).unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    kernel.close(child, r).unwrap();

    let mut buf = [0u8; 16];
    let (read, written) = tokio::join!(kernel.read(INIT_PID, r, &mut buf), async {
        kernel.nanosleep(child, Duration::from_millis(40)).await?;
        kernel.write(child, w, b"late").await
    });
    assert_eq!(written.unwrap(), 4);
    let n = read.unwrap();
    assert_eq!(&buf[..n], b"late");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_eof_after_last_writer_closes() {
    let kernel = Kernel::boot().unwrap();
    let (r, w) = kernel.pipe(INIT_PID, 0).unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    kernel.close(INIT_PID, w).unwrap();

    // The child still holds a write end
    let err = {
        let handle = kernel.processes().fds(INIT_PID).unwrap().lock().handle(r).unwrap();
        handle.read(&mut [0u8; 4]).unwrap_err()
    };
    assert_eq!(err.kind(), ErrorKind::WouldBlock);

    kernel.write(child, w, b"bye").await.unwrap();
    kernel.exit(child, 0).unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(kernel.read(INIT_PID, r, &mut buf).await.unwrap(), 3);
    assert_eq!(kernel.read(INIT_PID, r, &mut buf).await.unwrap(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_nonblocking_empty_read() {
    let kernel = Kernel::boot().unwrap();
    let (r, _w) = kernel.pipe(INIT_PID, O_NONBLOCK | O_CLOEXEC).unwrap();
    let mut buf = [0u8; 4];
    let err = kernel.read(INIT_PID, r, &mut buf).await.unwrap_err();
    assert_eq!(posix_kernel::to_errno(&err), Errno::EAGAIN);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_full_pipe_accepts_partial_writes() {
    let kernel = small_pipes(16);
    let (r, w) = kernel.pipe(INIT_PID, O_NONBLOCK).unwrap();

    assert_eq!(kernel.write(INIT_PID, w, &[1u8; 20]).await.unwrap(), 16);
    let err = kernel.write(INIT_PID, w, b"x").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WouldBlock);

    let mut buf = [0u8; 4];
    kernel.read(INIT_PID, r, &mut buf).await.unwrap();
    assert_eq!(kernel.write(INIT_PID, w, b"abcdef").await.unwrap(), 4);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_blocking_write_waits_for_room() {
    let kernel = small_pipes(8);
    let (r, w) = kernel.pipe(INIT_PID, 0).unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    assert_eq!(kernel.write(INIT_PID, w, &[0u8; 8]).await.unwrap(), 8);

    let mut buf = [0u8; 3];
    let (written, drained) = tokio::join!(kernel.write(INIT_PID, w, b"more"), async {
        kernel.nanosleep(child, Duration::from_millis(25)).await?;
        kernel.read(child, r, &mut buf).await
    });
    assert_eq!(drained.unwrap(), 3);
    assert_eq!(written.unwrap(), 3);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_write_without_readers_raises_sigpipe() {
    let kernel = Kernel::boot().unwrap();
    let (r, w) = kernel.pipe(INIT_PID, 0).unwrap();
    let child = kernel.fork(INIT_PID).unwrap();
    kernel.close(INIT_PID, r).unwrap();
    kernel.close(child, r).unwrap();

    let err = kernel.write(child, w, b"nobody").await.unwrap_err();
    assert_eq!(posix_kernel::to_errno(&err), Errno::EPIPE);
    assert!(kernel.processes().info(child).unwrap().pending.contains(Signal::SIGPIPE));

    assert!(matches!(kernel.deliver_signals(child).unwrap(), Delivery::Terminated(_)));
    let (_, status) = kernel.waitpid(INIT_PID, child as i32, 0).await.unwrap().unwrap();
    assert_eq!(status.term_sig(), Signal::SIGPIPE.number() as i32);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_socketpair_is_bidirectional() {
    let kernel = Kernel::boot().unwrap();
    let (a, b) = kernel.socketpair(INIT_PID, 0).unwrap();
    kernel.write(INIT_PID, a, b"ping").await.unwrap();
    kernel.write(INIT_PID, b, b"pong").await.unwrap();

    let mut buf = [0u8; 4];
    kernel.read(INIT_PID, b, &mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
    kernel.read(INIT_PID, a, &mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");
    assert_eq!(kernel.fstat(INIT_PID, a).unwrap().file_type, FileType::Socket);
}

#[test]
fn test_pipe_flags_are_checked() {
    let kernel = Kernel::boot().unwrap();
    let err = kernel.pipe(INIT_PID, O_CREAT).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let (r, w) = kernel.pipe(INIT_PID, O_CLOEXEC).unwrap();
    let fds = kernel.processes().fds(INIT_PID).unwrap();
    let table = fds.lock();
    assert!(table.cloexec(r).unwrap());
    assert!(table.cloexec(w).unwrap());
}
