/*!
 * Process Filesystem
 * `/proc` synthesized from the live process table
 */

use std::any::Any;
use std::time::SystemTime;

use super::node::{Node, NodeKind, NodeRef};
use super::providers::{DynamicGroup, Generator, Property, Symlink};
use super::traits::{DirIter, NodeOps};
use super::types::*;
use crate::core::data_structures::InlineString;
use crate::core::limits::COMM_LEN;
use crate::core::types::{NodeId, Pid};
use crate::process::{ProcessInfo, ProcessTable, WeakProcessTable};

/// Entries of a process directory, in listing order
const PROCESS_ENTRIES: &[(&str, FileType)] = &[
    ("stat", FileType::File),
    ("status", FileType::File),
    ("cmdline", FileType::File),
    ("comm", FileType::File),
    ("cwd", FileType::Symlink),
    ("fd", FileType::Directory),
    ("task", FileType::Directory),
];

/// Entries of a `task/<tid>` directory
const TASK_ENTRIES: &[(&str, FileType)] = &[
    ("stat", FileType::File),
    ("status", FileType::File),
    ("comm", FileType::File),
];

/// Build the `/proc` directory over `table`
///
/// The node holds only a weak handle; once the table is gone every entry
/// reports NotFound.
pub fn create(table: &ProcessTable) -> NodeRef {
    let weak = table.downgrade();
    let root = Node::new(
        NodeKind::DynamicGroup,
        "proc",
        None,
        DynamicGroup::new(ProcessGenerator {
            table: weak.clone(),
        }),
    );
    let self_link = Node::new(
        NodeKind::Symlink,
        "self",
        None,
        Symlink::computed(move || {
            let table = upgrade(&weak)?;
            let tid = table.current();
            table
                .with_record(tid, |r| r.pid.to_string())
                .map_err(|_| gone(tid))
        }),
    );
    if let Some(group) = root.provider::<DynamicGroup>() {
        group.attach(&root, "self", self_link);
    }
    root
}

fn upgrade(table: &WeakProcessTable) -> VfsResult<ProcessTable> {
    table
        .upgrade()
        .ok_or_else(|| VfsError::NotFound("process table is gone".into()))
}

#[inline]
fn gone(tid: Pid) -> VfsError {
    VfsError::NotFound(tid.to_string())
}

fn info_of(table: &WeakProcessTable, tid: Pid) -> VfsResult<ProcessInfo> {
    upgrade(table)?.info(tid).map_err(|_| gone(tid))
}

/// One directory per thread-group leader, zombies included
struct ProcessGenerator {
    table: WeakProcessTable,
}

impl Generator for ProcessGenerator {
    fn keys(&self) -> Vec<u64> {
        self.table
            .upgrade()
            .map(|table| table.leaders().into_iter().map(u64::from).collect())
            .unwrap_or_default()
    }

    fn materialize(&self, parent: &NodeRef, key: u64, id: NodeId) -> VfsResult<NodeRef> {
        let pid = Pid::try_from(key).map_err(|_| VfsError::NotFound(key.to_string()))?;
        let table = upgrade(&self.table)?;
        if !table.with_record(pid, |r| r.is_leader()).unwrap_or(false) {
            return Err(gone(pid));
        }
        Ok(Node::with_id(
            id,
            NodeKind::Directory,
            pid.to_string(),
            Some(parent),
            ProcessDir::new(self.table.clone(), pid, false),
        ))
    }
}

/// Threads of one group under `task/`
struct TaskGenerator {
    table: WeakProcessTable,
    pid: Pid,
}

impl Generator for TaskGenerator {
    fn keys(&self) -> Vec<u64> {
        self.table
            .upgrade()
            .map(|table| table.threads_of(self.pid).into_iter().map(u64::from).collect())
            .unwrap_or_default()
    }

    fn materialize(&self, parent: &NodeRef, key: u64, id: NodeId) -> VfsResult<NodeRef> {
        let tid = Pid::try_from(key).map_err(|_| VfsError::NotFound(key.to_string()))?;
        let table = upgrade(&self.table)?;
        if table.with_record(tid, |r| r.pid) != Ok(self.pid) {
            return Err(gone(tid));
        }
        Ok(Node::with_id(
            id,
            NodeKind::Directory,
            tid.to_string(),
            Some(parent),
            ProcessDir::new(self.table.clone(), tid, true),
        ))
    }
}

/// Descriptors of a process under `fd/`, each a symlink to the handle's path
struct FdGenerator {
    table: WeakProcessTable,
    tid: Pid,
}

impl Generator for FdGenerator {
    fn keys(&self) -> Vec<u64> {
        self.table
            .upgrade()
            .and_then(|table| table.fds(self.tid).ok())
            .map(|fds| fds.lock().fds().into_iter().map(u64::from).collect())
            .unwrap_or_default()
    }

    fn entry_type(&self, _key: u64) -> FileType {
        FileType::Symlink
    }

    fn materialize(&self, parent: &NodeRef, key: u64, id: NodeId) -> VfsResult<NodeRef> {
        let missing = || VfsError::NotFound(key.to_string());
        let fd = u32::try_from(key).map_err(|_| missing())?;
        let fds = upgrade(&self.table)?.fds(self.tid).map_err(|_| gone(self.tid))?;
        let handle = fds.lock().handle(fd).map_err(|_| missing())?;
        Ok(Node::with_id(
            id,
            NodeKind::Symlink,
            key.to_string(),
            Some(parent),
            Symlink::fixed(handle.path()),
        ))
    }
}

/// `/proc/<pid>` or `/proc/<pid>/task/<tid>`
struct ProcessDir {
    table: WeakProcessTable,
    tid: Pid,
    task: bool,
    created: SystemTime,
}

impl ProcessDir {
    fn new(table: WeakProcessTable, tid: Pid, task: bool) -> Self {
        Self {
            table,
            tid,
            task,
            created: SystemTime::now(),
        }
    }

    fn entries(&self) -> &'static [(&'static str, FileType)] {
        if self.task {
            TASK_ENTRIES
        } else {
            PROCESS_ENTRIES
        }
    }

    fn build(&self, this: &NodeRef, index: usize, name: &str) -> VfsResult<NodeRef> {
        let id = NodeId::derived(this.id(), index as u64);
        let table = self.table.clone();
        let tid = self.tid;
        let node = match name {
            "stat" => Node::with_id(
                id,
                NodeKind::Property,
                name,
                Some(this),
                Property::read_only(move || info_of(&table, tid).map(|info| render_stat(&info))),
            ),
            "status" => Node::with_id(
                id,
                NodeKind::Property,
                name,
                Some(this),
                Property::read_only(move || info_of(&table, tid).map(|info| render_status(&info))),
            ),
            "cmdline" => Node::with_id(
                id,
                NodeKind::Property,
                name,
                Some(this),
                Property::read_only(move || {
                    info_of(&table, tid).map(|info| {
                        info.argv.iter().fold(String::new(), |mut out, arg| {
                            out.push_str(arg);
                            out.push('\0');
                            out
                        })
                    })
                }),
            ),
            "comm" => {
                let writer = table.clone();
                Node::with_id(
                    id,
                    NodeKind::Property,
                    name,
                    Some(this),
                    Property::read_write(
                        move || info_of(&table, tid).map(|info| format!("{}\n", info.name)),
                        move |text| {
                            let name = InlineString::truncated(text.trim_end_matches('\n'), COMM_LEN);
                            upgrade(&writer)?.set_name(tid, &name).map_err(|_| gone(tid))
                        },
                    ),
                )
            }
            "cwd" => Node::with_id(
                id,
                NodeKind::Symlink,
                name,
                Some(this),
                Symlink::computed(move || upgrade(&table)?.cwd(tid).map_err(|_| gone(tid))?.path()),
            ),
            "fd" => Node::with_id(
                id,
                NodeKind::DynamicGroup,
                name,
                Some(this),
                DynamicGroup::new(FdGenerator { table, tid }),
            ),
            "task" => Node::with_id(
                id,
                NodeKind::DynamicGroup,
                name,
                Some(this),
                DynamicGroup::new(TaskGenerator { table, pid: tid }),
            ),
            _ => return Err(VfsError::NotFound(name.to_string())),
        };
        Ok(node)
    }

    fn check_alive(&self) -> VfsResult<()> {
        upgrade(&self.table)?
            .with_record(self.tid, |_| ())
            .map_err(|_| gone(self.tid))
    }
}

impl NodeOps for ProcessDir {
    fn lookup(&self, this: &NodeRef, name: &str) -> VfsResult<NodeRef> {
        self.check_alive()?;
        let index = self
            .entries()
            .iter()
            .position(|(entry, _)| *entry == name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        self.build(this, index, name)
    }

    fn iterate(&self, this: &NodeRef) -> VfsResult<DirIter> {
        self.check_alive()?;
        let parent = this.id();
        Ok(DirIter::from_entries(
            self.entries()
                .iter()
                .enumerate()
                .map(|(index, (name, file_type))| {
                    Entry::new(NodeId::derived(parent, index as u64), *name, *file_type)
                })
                .collect(),
        ))
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
        self.check_alive()?;
        Ok(Metadata::new(
            this.id(),
            FileType::Directory,
            0,
            Permissions::new(0o555),
            self.created,
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn render_stat(info: &ProcessInfo) -> String {
    let (utime, stime) = info.times.ticks();
    let (cutime, cstime) = info.child_times.ticks();
    format!(
        "{} ({}) {} {} {} {} 0 -1 0 0 0 0 0 {} {} {} {} 20 0 {} 0 0 {} 0\n",
        info.tid,
        info.name,
        info.state_char(),
        info.ppid,
        info.pgid,
        info.sid,
        utime,
        stime,
        cutime,
        cstime,
        info.threads,
        info.mapped_bytes,
    )
}

fn render_status(info: &ProcessInfo) -> String {
    format!(
        "Name:\t{}\nState:\t{} ({})\nTgid:\t{}\nPid:\t{}\nPPid:\t{}\nTracerPid:\t{}\nThreads:\t{}\nSigPnd:\t{:016x}\nSigBlk:\t{:016x}\n",
        info.name,
        info.state_char(),
        info.state_name(),
        info.pid,
        info.tid,
        info.ppid,
        if info.traced { info.ppid } else { 0 },
        info.threads,
        info.pending.bits(),
        info.blocked.bits(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_gone_without_table() {
        let table = ProcessTable::new(Default::default());
        let root = create(&table);
        drop(table);
        assert!(root.lookup("1").is_err());
        assert!(root.lookup("self").unwrap().read_link().is_err());
        assert_eq!(root.iterate().unwrap().count(), 1);
    }

    #[test]
    fn test_stat_line_shape() {
        let info = ProcessInfo {
            tid: 5,
            pid: 5,
            ppid: 1,
            pgid: 5,
            sid: 1,
            stage: crate::process::Stage::Running,
            sleeping: true,
            traced: false,
            name: "sh".into(),
            argv: vec!["sh".into()],
            threads: 1,
            exit: None,
            pending: Default::default(),
            blocked: Default::default(),
            times: Default::default(),
            child_times: Default::default(),
            mapped_bytes: 0,
        };
        let line = render_stat(&info);
        assert!(line.starts_with("5 (sh) S 1 5 1 "));
        assert!(render_status(&info).contains("State:\tS (sleeping)\n"));
    }
}
