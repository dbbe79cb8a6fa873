/*!
 * Descriptor Tests
 * Allocation, aliasing, fcntl and ioctl through the syscall surface
 */

use posix_kernel::core::ErrorKind;
use posix_kernel::fd::{F_DUPFD, F_DUPFD_CLOEXEC, F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, FIOCLEX, FIONBIO, FIONREAD};
use posix_kernel::vfs::types::open_flags::{O_APPEND, O_CLOEXEC, O_CREAT, O_NONBLOCK, O_RDONLY, O_RDWR, O_WRONLY};
use posix_kernel::{Errno, Kernel, KernelConfig, INIT_PID};
use pretty_assertions::assert_eq;

const SEEK_SET: u32 = 0;
const SEEK_END: u32 = 2;

fn kernel_with_file(path: &str, data: &[u8]) -> Kernel {
    let kernel = Kernel::boot().unwrap();
    let fd = kernel.open(INIT_PID, path, O_CREAT | O_WRONLY, 0o644).unwrap();
    let handle = kernel.processes().fds(INIT_PID).unwrap().lock().handle(fd).unwrap();
    handle.write(data).unwrap();
    drop(handle);
    kernel.close(INIT_PID, fd).unwrap();
    kernel
}

#[test]
fn test_lowest_free_descriptor() {
    let kernel = Kernel::boot().unwrap();
    let a = kernel.open(INIT_PID, "/dev/null", O_RDONLY, 0).unwrap();
    let b = kernel.open(INIT_PID, "/dev/null", O_RDONLY, 0).unwrap();
    let c = kernel.open(INIT_PID, "/dev/null", O_RDONLY, 0).unwrap();
    assert_eq!((a, b, c), (0, 1, 2));

    kernel.close(INIT_PID, b).unwrap();
    assert_eq!(kernel.open(INIT_PID, "/dev/zero", O_RDONLY, 0).unwrap(), 1);
    assert_eq!(kernel.dup(INIT_PID, a).unwrap(), 3);
}

#[test]
fn test_close_twice_is_bad_descriptor() {
    let kernel = Kernel::boot().unwrap();
    let fd = kernel.open(INIT_PID, "/dev/null", O_RDONLY, 0).unwrap();
    kernel.close(INIT_PID, fd).unwrap();
    let err = kernel.close(INIT_PID, fd).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);
    assert_eq!(posix_kernel::to_errno(&err), Errno::EBADF);
}

#[test]
fn test_descriptor_limit() {
    let config = KernelConfig {
        max_fds: 2,
        ..KernelConfig::default()
    };
    let kernel = Kernel::builder().with_config(config).build().unwrap();
    kernel.open(INIT_PID, "/dev/null", O_RDONLY, 0).unwrap();
    kernel.open(INIT_PID, "/dev/null", O_RDONLY, 0).unwrap();
    let err = kernel.open(INIT_PID, "/dev/null", O_RDONLY, 0).unwrap_err();
    assert_eq!(posix_kernel::to_errno(&err), Errno::EMFILE);

    // A failed pipe leaves no half-installed descriptor behind
    kernel.close(INIT_PID, 1).unwrap();
    assert!(kernel.pipe(INIT_PID, 0).is_err());
    assert_eq!(kernel.processes().fds(INIT_PID).unwrap().lock().fds(), vec![0]);
}

#[test]
fn test_dup2_onto_itself_changes_nothing() {
    let kernel = kernel_with_file("/tmp/f", b"data");
    let fd = kernel.open(INIT_PID, "/tmp/f", O_RDONLY | O_CLOEXEC, 0).unwrap();
    let node = kernel.vfs().resolve(kernel.vfs().root(), "/tmp/f", true).unwrap();
    let before = node.open_count();

    assert_eq!(kernel.dup2(INIT_PID, fd, fd).unwrap(), fd);
    assert_eq!(node.open_count(), before);
    assert_eq!(kernel.fcntl(INIT_PID, fd, F_GETFD, 0).unwrap(), i64::from(FD_CLOEXEC));

    let err = kernel.dup2(INIT_PID, 9, 9).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);
}

#[test]
fn test_dup2_closes_the_displaced_handle() {
    let kernel = kernel_with_file("/tmp/f", b"data");
    let first = kernel.open(INIT_PID, "/tmp/f", O_RDONLY, 0).unwrap();
    let second = kernel.open(INIT_PID, "/tmp/f", O_RDONLY | O_CLOEXEC, 0).unwrap();
    let node = kernel.vfs().resolve(kernel.vfs().root(), "/tmp/f", true).unwrap();
    assert_eq!(node.open_count(), 2);

    kernel.dup2(INIT_PID, first, second).unwrap();
    assert_eq!(node.open_count(), 1);
    // The alias never inherits close-on-exec
    assert_eq!(kernel.fcntl(INIT_PID, second, F_GETFD, 0).unwrap(), 0);

    kernel.close(INIT_PID, first).unwrap();
    assert_eq!(node.open_count(), 1);
    kernel.close(INIT_PID, second).unwrap();
    assert_eq!(node.open_count(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_aliases_share_position() {
    let kernel = kernel_with_file("/tmp/f", b"abcdef");
    let fd = kernel.open(INIT_PID, "/tmp/f", O_RDONLY, 0).unwrap();
    let alias = kernel.dup(INIT_PID, fd).unwrap();

    let mut buf = [0u8; 2];
    kernel.read(INIT_PID, fd, &mut buf).await.unwrap();
    assert_eq!(&buf, b"ab");
    kernel.read(INIT_PID, alias, &mut buf).await.unwrap();
    assert_eq!(&buf, b"cd");

    assert_eq!(kernel.lseek(INIT_PID, alias, 0, SEEK_END).unwrap(), 6);
    assert_eq!(kernel.read(INIT_PID, fd, &mut buf).await.unwrap(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_append_and_truncate() {
    let kernel = kernel_with_file("/tmp/log", b"one\n");
    let fd = kernel.open(INIT_PID, "/tmp/log", O_RDWR | O_APPEND, 0).unwrap();
    kernel.lseek(INIT_PID, fd, 0, SEEK_SET).unwrap();
    kernel.write(INIT_PID, fd, b"two\n").await.unwrap();
    assert_eq!(kernel.fstat(INIT_PID, fd).unwrap().size, 8);

    kernel.ftruncate(INIT_PID, fd, 3).unwrap();
    assert_eq!(kernel.stat(INIT_PID, "/tmp/log").unwrap().size, 3);

    let err = kernel.lseek(INIT_PID, fd, -10, SEEK_SET).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_access_mode_is_enforced() {
    let kernel = kernel_with_file("/tmp/f", b"x");
    let ro = kernel.open(INIT_PID, "/tmp/f", O_RDONLY, 0).unwrap();
    let err = kernel.write(INIT_PID, ro, b"y").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);

    let wo = kernel.open(INIT_PID, "/tmp/f", O_WRONLY, 0).unwrap();
    let mut buf = [0u8; 1];
    let err = kernel.read(INIT_PID, wo, &mut buf).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadDescriptor);
}

#[test]
fn test_fcntl_commands() {
    let kernel = Kernel::boot().unwrap();
    let fd = kernel.open(INIT_PID, "/dev/null", O_RDWR, 0).unwrap();

    assert_eq!(kernel.fcntl(INIT_PID, fd, F_DUPFD, 10).unwrap(), 10);
    assert_eq!(kernel.fcntl(INIT_PID, fd, F_DUPFD, 10).unwrap(), 11);
    let cloexec = kernel.fcntl(INIT_PID, fd, F_DUPFD_CLOEXEC, 0).unwrap() as u32;
    assert_eq!(cloexec, 1);
    assert_eq!(kernel.fcntl(INIT_PID, cloexec, F_GETFD, 0).unwrap(), i64::from(FD_CLOEXEC));

    kernel.fcntl(INIT_PID, fd, F_SETFD, u64::from(FD_CLOEXEC)).unwrap();
    assert_eq!(kernel.fcntl(INIT_PID, fd, F_GETFD, 0).unwrap(), i64::from(FD_CLOEXEC));

    assert_eq!(kernel.fcntl(INIT_PID, fd, F_GETFL, 0).unwrap(), i64::from(O_RDWR));
    kernel
        .fcntl(INIT_PID, fd, F_SETFL, u64::from(O_APPEND | O_NONBLOCK))
        .unwrap();
    assert_eq!(
        kernel.fcntl(INIT_PID, fd, F_GETFL, 0).unwrap(),
        i64::from(O_RDWR | O_APPEND | O_NONBLOCK)
    );

    let err = kernel.fcntl(INIT_PID, fd, F_DUPFD, 1 << 20).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = kernel.fcntl(INIT_PID, fd, 999, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_ioctl_requests() {
    let kernel = kernel_with_file("/tmp/f", b"0123456789");
    let fd = kernel.open(INIT_PID, "/tmp/f", O_RDONLY, 0).unwrap();
    assert_eq!(kernel.ioctl(INIT_PID, fd, FIONREAD, 0).unwrap(), 10);
    let mut buf = [0u8; 4];
    kernel.read(INIT_PID, fd, &mut buf).await.unwrap();
    assert_eq!(kernel.ioctl(INIT_PID, fd, FIONREAD, 0).unwrap(), 6);

    kernel.ioctl(INIT_PID, fd, FIOCLEX, 0).unwrap();
    assert_eq!(kernel.fcntl(INIT_PID, fd, F_GETFD, 0).unwrap(), i64::from(FD_CLOEXEC));

    kernel.ioctl(INIT_PID, fd, FIONBIO, 1).unwrap();
    assert_eq!(
        kernel.fcntl(INIT_PID, fd, F_GETFL, 0).unwrap() as u32 & O_NONBLOCK,
        O_NONBLOCK
    );

    // Anything else goes to the file, which is not a terminal
    let err = kernel.ioctl(INIT_PID, fd, 0x5401, 0).unwrap_err();
    assert_eq!(posix_kernel::to_errno(&err), Errno::ENOTTY);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_devices() {
    let kernel = Kernel::boot().unwrap();
    let null = kernel.open(INIT_PID, "/dev/null", O_RDWR, 0).unwrap();
    let zero = kernel.open(INIT_PID, "/dev/zero", O_RDONLY, 0).unwrap();
    let full = kernel.open(INIT_PID, "/dev/full", O_WRONLY, 0).unwrap();

    let mut buf = [7u8; 8];
    assert_eq!(kernel.read(INIT_PID, null, &mut buf).await.unwrap(), 0);
    assert_eq!(kernel.write(INIT_PID, null, b"gone").await.unwrap(), 4);
    assert_eq!(kernel.read(INIT_PID, zero, &mut buf).await.unwrap(), 8);
    assert_eq!(buf, [0u8; 8]);

    let err = kernel.write(INIT_PID, full, b"x").await.unwrap_err();
    assert_eq!(posix_kernel::to_errno(&err), Errno::ENOSPC);
}

#[test]
fn test_fork_copies_the_table_but_shares_handles() {
    let kernel = kernel_with_file("/tmp/f", b"abc");
    let fd = kernel.open(INIT_PID, "/tmp/f", O_RDONLY, 0).unwrap();
    let child = kernel.fork(INIT_PID).unwrap();

    kernel.lseek(child, fd, 2, SEEK_SET).unwrap();
    let parent_handle = kernel.processes().fds(INIT_PID).unwrap().lock().handle(fd).unwrap();
    assert_eq!(parent_handle.position(), 2);

    // Closing in the child leaves the parent's slot
    kernel.close(child, fd).unwrap();
    assert!(kernel.fstat(INIT_PID, fd).is_ok());
    assert_eq!(kernel.fstat(child, fd).unwrap_err().kind(), ErrorKind::BadDescriptor);
}

#[test]
fn test_threads_share_the_table() {
    let kernel = Kernel::boot().unwrap();
    let thread = kernel.clone_thread(INIT_PID).unwrap();
    let fd = kernel.open(thread, "/dev/null", O_RDONLY, 0).unwrap();
    assert!(kernel.fstat(INIT_PID, fd).is_ok());
    kernel.close(INIT_PID, fd).unwrap();
    assert!(kernel.fstat(thread, fd).is_err());
}
