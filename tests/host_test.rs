/*!
 * Host Storage Tests
 * The /storage mount reads and writes a real host directory
 */

use std::fs;

use posix_kernel::vfs::types::open_flags::{O_CREAT, O_RDONLY, O_WRONLY};
use posix_kernel::{Errno, FileType, Kernel, INIT_PID};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_files_written_through_storage_land_on_host() {
    let dir = tempdir().unwrap();
    let kernel = Kernel::builder().with_storage(dir.path()).build().unwrap();

    kernel.mkdir(INIT_PID, "/storage/logs", 0o755).unwrap();
    let fd = kernel
        .open(INIT_PID, "/storage/logs/run.txt", O_CREAT | O_WRONLY, 0o644)
        .unwrap();
    kernel.write(INIT_PID, fd, b"persisted").await.unwrap();
    kernel.close(INIT_PID, fd).unwrap();

    let on_host = fs::read(dir.path().join("logs/run.txt")).unwrap();
    assert_eq!(on_host, b"persisted");
    assert_eq!(kernel.stat(INIT_PID, "/storage/logs/run.txt").unwrap().size, 9);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_host_files_are_visible_inside() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"from host").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    let kernel = Kernel::builder().with_storage(dir.path()).build().unwrap();

    let entries = kernel.read_dir(INIT_PID, "/storage").unwrap();
    let listing: Vec<(String, FileType)> = entries
        .iter()
        .map(|e| (e.name.to_string(), e.file_type))
        .collect();
    assert_eq!(
        listing,
        vec![
            ("a.txt".to_string(), FileType::File),
            ("sub".to_string(), FileType::Directory)
        ]
    );

    let fd = kernel.open(INIT_PID, "/storage/a.txt", O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 32];
    let n = kernel.read(INIT_PID, fd, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"from host");
}

#[test]
fn test_rename_and_unlink_on_host() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("old"), b"x").unwrap();
    let kernel = Kernel::builder().with_storage(dir.path()).build().unwrap();

    kernel.rename(INIT_PID, "/storage/old", "/storage/new").unwrap();
    assert!(!dir.path().join("old").exists());
    assert!(dir.path().join("new").exists());

    // Moving between the host mount and memory crosses devices
    let err = kernel.rename(INIT_PID, "/storage/new", "/tmp/new").unwrap_err();
    assert_eq!(posix_kernel::to_errno(&err), Errno::EXDEV);

    kernel.unlink(INIT_PID, "/storage/new").unwrap();
    assert!(!dir.path().join("new").exists());
}

#[test]
fn test_storage_survives_reboot() {
    let dir = tempdir().unwrap();
    {
        let kernel = Kernel::builder().with_storage(dir.path()).build().unwrap();
        kernel.mkdir(INIT_PID, "/storage/kept", 0o700).unwrap();
        kernel.mkdir(INIT_PID, "/tmp/lost", 0o700).unwrap();
    }

    let kernel = Kernel::builder().with_storage(dir.path()).build().unwrap();
    assert_eq!(
        kernel.stat(INIT_PID, "/storage/kept").unwrap().file_type,
        FileType::Directory
    );
    assert!(kernel.stat(INIT_PID, "/tmp/lost").is_err());
}
