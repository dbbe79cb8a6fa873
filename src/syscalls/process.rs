/*!
 * Process Syscalls
 * fork, vfork, clone, execve, exit and process identity
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::core::errors::KernelResult;
use crate::core::limits::{MAX_INTERPRETER_DEPTH, MAX_SHEBANG_LINE};
use crate::core::types::Pid;
use crate::kernel::Kernel;
use crate::process::{ExitStatus, ProcessError, SharingMode, Times};
use crate::vfs::{FileType, NodeRef, OpenFlags};

/// Image handed to the CPU emulator after a successful execve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecImage {
    /// Process id after exec (a non-leader exec takes over the leader's id)
    pub pid: Pid,
    /// Path of the binary that was finally loaded
    pub path: String,
    /// Argument vector after interpreter expansion
    pub argv: Vec<String>,
    pub envp: Vec<String>,
    #[serde(skip)]
    pub image: Vec<u8>,
}

/// `#!` line of a script: interpreter and its optional single argument
#[derive(Debug, PartialEq, Eq)]
struct Shebang {
    interpreter: String,
    arg: Option<String>,
}

fn parse_shebang(path: &str, image: &[u8]) -> KernelResult<Option<Shebang>> {
    if !image.starts_with(b"#!") {
        return Ok(None);
    }
    let head = &image[2..image.len().min(MAX_SHEBANG_LINE)];
    let line = head.split(|&b| b == b'\n').next().unwrap_or_default();
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let (interpreter, arg) = match line.find([' ', '\t']) {
        Some(split) => (&line[..split], Some(line[split..].trim())),
        None => (line, None),
    };
    if interpreter.is_empty() {
        return Err(ProcessError::NotExecutable(format!("{}: empty interpreter line", path)).into());
    }
    Ok(Some(Shebang {
        interpreter: interpreter.to_string(),
        arg: arg.filter(|a| !a.is_empty()).map(str::to_string),
    }))
}

/// Read an executable regular file in full
fn load_image(node: &NodeRef, path: &str) -> KernelResult<Vec<u8>> {
    let meta = node.metadata()?;
    if meta.file_type != FileType::File || !meta.permissions.is_executable() {
        return Err(ProcessError::PermissionDenied(format!("{} is not an executable file", path)).into());
    }
    let mut channel = node.open(OpenFlags::read_only())?;
    let mut image = Vec::with_capacity(meta.size as usize);
    let mut chunk = [0u8; 4096];
    loop {
        let n = channel.read(image.len() as u64, &mut chunk)?;
        if n == 0 {
            break;
        }
        image.extend_from_slice(&chunk[..n]);
    }
    channel.close();
    Ok(image)
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

impl Kernel {
    #[instrument(skip(self))]
    pub fn fork(&self, tid: Pid) -> KernelResult<Pid> {
        self.enter(tid);
        Ok(self.processes().create(tid, SharingMode::Fork)?)
    }

    /// Create a child sharing the caller's address space
    ///
    /// The caller must not touch that address space until `wait_vfork`
    /// returns, which happens once the child execs or exits.
    #[instrument(skip(self))]
    pub fn vfork(&self, tid: Pid) -> KernelResult<Pid> {
        self.enter(tid);
        Ok(self.processes().create(tid, SharingMode::Vfork)?)
    }

    /// Park the vfork parent until `child` releases it
    ///
    /// Signals stay pending meanwhile; the wait is not interruptible.
    pub async fn wait_vfork(&self, tid: Pid, child: Pid) -> KernelResult<()> {
        while self.processes().vfork_pending(child) {
            self.checkpoint(tid).await?;
            self.suspend(tid).await;
        }
        debug!(tid, child, "Vfork parent resumed");
        Ok(())
    }

    /// New thread in the caller's group
    #[instrument(skip(self))]
    pub fn clone_thread(&self, tid: Pid) -> KernelResult<Pid> {
        self.enter(tid);
        Ok(self.processes().create(tid, SharingMode::Thread)?)
    }

    /// Replace the program of the caller's process
    ///
    /// Nothing about the process changes unless the image (and every
    /// interpreter it names) loads.
    #[instrument(skip(self, argv, envp))]
    pub fn execve(&self, tid: Pid, path: &str, argv: Vec<String>, envp: Vec<String>) -> KernelResult<ExecImage> {
        self.enter(tid);
        let cwd = self.processes().cwd(tid)?;
        let mut current = path.to_string();
        let mut argv = argv;
        let mut depth = 0;

        let image = loop {
            let node = self.vfs().resolve(&cwd, &current, true)?;
            let image = load_image(&node, &current)?;
            let Some(shebang) = parse_shebang(&current, &image)? else {
                break image;
            };
            depth += 1;
            if depth > MAX_INTERPRETER_DEPTH {
                return Err(ProcessError::InterpreterLoop(path.to_string()).into());
            }
            debug!(script = %current, interpreter = %shebang.interpreter, "Interpreter script");
            let mut expanded = vec![shebang.interpreter.clone()];
            expanded.extend(shebang.arg);
            expanded.push(current);
            expanded.extend(argv.into_iter().skip(1));
            argv = expanded;
            current = shebang.interpreter;
        };

        let pid = self.processes().commit_exec(tid, basename(path), argv.clone())?;
        info!(pid, path = %current, "Exec image loaded");
        Ok(ExecImage {
            pid,
            path: current,
            argv,
            envp,
            image,
        })
    }

    /// Terminate the caller's process with `code & 0xff`
    #[instrument(skip(self))]
    pub fn exit(&self, tid: Pid, code: i32) -> KernelResult<()> {
        Ok(self.processes().exit_group(tid, ExitStatus::exited(code & 0xff))?)
    }

    #[instrument(skip(self))]
    pub fn exit_thread(&self, tid: Pid, code: i32) -> KernelResult<()> {
        Ok(self.processes().exit_thread(tid, ExitStatus::exited(code & 0xff))?)
    }

    pub fn getpid(&self, tid: Pid) -> KernelResult<Pid> {
        Ok(self.processes().with_record(tid, |r| r.pid)?)
    }

    pub fn getppid(&self, tid: Pid) -> KernelResult<Pid> {
        Ok(self.processes().with_record(tid, |r| r.ppid)?)
    }

    pub fn gettid(&self, tid: Pid) -> KernelResult<Pid> {
        Ok(self.processes().with_record(tid, |r| r.tid)?)
    }

    pub fn getpgid(&self, tid: Pid, pid: Pid) -> KernelResult<Pid> {
        let caller = self.getpid(tid)?;
        Ok(self.processes().getpgid(caller, pid)?)
    }

    pub fn setpgid(&self, tid: Pid, pid: Pid, pgid: Pid) -> KernelResult<()> {
        Ok(self.processes().setpgid(tid, pid, pgid)?)
    }

    pub fn getsid(&self, tid: Pid, pid: Pid) -> KernelResult<Pid> {
        let caller = self.getpid(tid)?;
        Ok(self.processes().getsid(caller, pid)?)
    }

    pub fn setsid(&self, tid: Pid) -> KernelResult<Pid> {
        Ok(self.processes().setsid(tid)?)
    }

    pub fn times(&self, tid: Pid) -> KernelResult<Times> {
        Ok(self.processes().times(tid)?)
    }

    /// CPU time consumed by `tid` as reported by the emulator
    pub fn charge_time(&self, tid: Pid, user: Duration, system: Duration) -> KernelResult<()> {
        Ok(self.processes().charge_time(tid, user, system)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shebang_parsing() {
        assert_eq!(parse_shebang("/bin/x", b"\x7fELF").unwrap(), None);
        assert_eq!(
            parse_shebang("/bin/x", b"#! /bin/sh -e  \necho").unwrap(),
            Some(Shebang {
                interpreter: "/bin/sh".into(),
                arg: Some("-e".into())
            })
        );
        assert_eq!(
            parse_shebang("/bin/x", b"#!/usr/bin/env python3 -u\n").unwrap(),
            Some(Shebang {
                interpreter: "/usr/bin/env".into(),
                arg: Some("python3 -u".into())
            })
        );
        assert!(parse_shebang("/bin/x", b"#!   \n").is_err());
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/bin/sh"), "sh");
        assert_eq!(basename("prog"), "prog");
        assert_eq!(basename("/usr/bin/"), "bin");
    }
}
