/*!
 * Path Resolver
 * Walks the node graph segment by segment, expanding symlinks
 */

use std::sync::Arc;

use super::node::NodeRef;
use super::types::*;
use crate::core::data_structures::InlineString;
use crate::core::limits::{MAX_NAME_LEN, MAX_PATH_LEN};

/// Result of resolving everything but the final component
#[derive(Debug)]
pub struct ParentLookup {
    /// Directory that holds (or will hold) the final component
    pub dir: NodeRef,
    /// Final component
    pub name: InlineString,
    /// The path ended with '/', so the final component must be a directory
    pub trailing_slash: bool,
}

/// Path resolver bound to a namespace root
///
/// ".." never climbs above `root`. Each symlink is expanded against the
/// directory that contains it; more than `max_expansions` expansions during
/// one resolution fails with SymlinkLoop.
pub struct Resolver<'a> {
    root: &'a NodeRef,
    max_expansions: usize,
}

impl<'a> Resolver<'a> {
    #[inline]
    pub fn new(root: &'a NodeRef, max_expansions: usize) -> Self {
        Self {
            root,
            max_expansions,
        }
    }

    /// Resolve `path` starting at `cwd` (relative) or the root (absolute)
    ///
    /// With `follow` unset a symlink in final position is returned as is.
    /// A trailing slash forces the final component to be followed and to be a
    /// directory.
    pub fn resolve(&self, cwd: &NodeRef, path: &str, follow: bool) -> VfsResult<NodeRef> {
        check_path(path)?;
        let mut pending = segments_reversed(path);
        if path.ends_with('/') && !path.trim_end_matches('/').is_empty() {
            // Resolving a trailing "." follows the final component and
            // requires a directory
            pending.insert(0, InlineString::from("."));
        }
        let start = if path.starts_with('/') { self.root } else { cwd };
        self.walk(start, pending, follow)
    }

    /// Resolve the directory part of `path` and return it with the final name
    pub fn resolve_parent(&self, cwd: &NodeRef, path: &str) -> VfsResult<ParentLookup> {
        check_path(path)?;
        let trimmed = path.trim_end_matches('/');
        let trailing_slash = trimmed.len() != path.len();
        if trimmed.is_empty() {
            return Err(VfsError::InvalidArgument(
                "path has no final component".into(),
            ));
        }
        let (dir_part, name) = match trimmed.rfind('/') {
            Some(idx) => (&trimmed[..idx + 1], &trimmed[idx + 1..]),
            None => ("", trimmed),
        };
        if name == "." || name == ".." {
            return Err(VfsError::InvalidArgument(format!(
                "'{}' cannot be created or removed",
                name
            )));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(VfsError::NameTooLong(name.to_string()));
        }

        let dir = if dir_part.is_empty() {
            Arc::clone(cwd)
        } else {
            self.resolve(cwd, dir_part, true)?
        };
        if !dir.is_dir() {
            return Err(VfsError::NotADirectory(dir_part.to_string()));
        }
        Ok(ParentLookup {
            dir,
            name: InlineString::from(name),
            trailing_slash,
        })
    }

    fn walk(&self, start: &NodeRef, mut pending: Vec<InlineString>, follow: bool) -> VfsResult<NodeRef> {
        // Ancestors stay alive while we walk below them, so ".." can pop back
        // into synthesized directories
        let mut chain: Vec<NodeRef> = vec![Arc::clone(start)];
        let mut expansions = 0usize;

        while let Some(segment) = pending.pop() {
            let is_last = pending.is_empty();
            let current = chain
                .last()
                .cloned()
                .ok_or_else(|| VfsError::NotFound("empty resolution chain".into()))?;

            match segment.as_str() {
                "." => {
                    if !current.is_dir() {
                        return Err(VfsError::NotADirectory(current.name().to_string()));
                    }
                }
                ".." => {
                    if !current.is_dir() {
                        return Err(VfsError::NotADirectory(current.name().to_string()));
                    }
                    self.ascend(&mut chain)?;
                }
                name => {
                    if !current.is_dir() {
                        return Err(VfsError::NotADirectory(current.name().to_string()));
                    }
                    let child = current.lookup(name)?;
                    if child.is_symlink() && (!is_last || follow) {
                        expansions += 1;
                        if expansions > self.max_expansions {
                            return Err(VfsError::SymlinkLoop(name.to_string()));
                        }
                        let target = child.read_link()?;
                        if target.is_empty() {
                            return Err(VfsError::NotFound(name.to_string()));
                        }
                        if target.ends_with('/') {
                            pending.push(InlineString::from("."));
                        }
                        pending.extend(segments_reversed(&target));
                        if target.starts_with('/') {
                            chain.clear();
                            chain.push(Arc::clone(self.root));
                        }
                    } else {
                        chain.push(child);
                    }
                }
            }
        }

        chain
            .pop()
            .ok_or_else(|| VfsError::NotFound("empty resolution chain".into()))
    }

    fn ascend(&self, chain: &mut Vec<NodeRef>) -> VfsResult<()> {
        if chain.len() > 1 {
            chain.pop();
            return Ok(());
        }
        let current = Arc::clone(&chain[0]);
        if Arc::ptr_eq(&current, self.root) {
            return Ok(());
        }
        // Started below the walk (cwd): follow the back-reference
        let parent = current
            .parent()
            .ok_or_else(|| VfsError::NotFound(format!("{} was removed", current.name())))?;
        chain[0] = parent;
        Ok(())
    }
}

fn check_path(path: &str) -> VfsResult<()> {
    if path.is_empty() {
        return Err(VfsError::NotFound("empty path".into()));
    }
    if path.len() > MAX_PATH_LEN {
        let prefix: String = path.chars().take(32).collect();
        return Err(VfsError::NameTooLong(format!("{}...", prefix)));
    }
    if path.contains('\0') {
        return Err(VfsError::InvalidPath("path contains a null byte".into()));
    }
    Ok(())
}

/// Non-empty segments in reverse order, ready to be popped
fn segments_reversed(path: &str) -> Vec<InlineString> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .rev()
        .map(InlineString::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::limits::MAX_SYMLINK_EXPANSIONS;
    use crate::vfs::providers::MemDirectory;

    fn tree() -> NodeRef {
        let root = MemDirectory::create_root();
        let usr = root.create_directory("usr", Permissions::executable()).unwrap();
        let bin = usr.create_directory("bin", Permissions::executable()).unwrap();
        bin.create_file("sh", Permissions::executable()).unwrap();
        root.create_symlink("bin", "usr/bin").unwrap();
        root.create_symlink("loop", "loop").unwrap();
        root.create_symlink("abs", "/usr/bin/sh").unwrap();
        root
    }

    #[test]
    fn test_dot_and_dotdot() {
        let root = tree();
        let r = Resolver::new(&root, MAX_SYMLINK_EXPANSIONS);
        let sh = r.resolve(&root, "/usr/./bin/../bin/sh", true).unwrap();
        assert_eq!(sh.name().as_str(), "sh");
        let top = r.resolve(&root, "/../../..", true).unwrap();
        assert!(Arc::ptr_eq(&top, &root));
    }

    #[test]
    fn test_symlinks_expand_relative_to_their_directory() {
        let root = tree();
        let r = Resolver::new(&root, MAX_SYMLINK_EXPANSIONS);
        let sh = r.resolve(&root, "/bin/sh", true).unwrap();
        assert_eq!(sh.path().unwrap(), "/usr/bin/sh");

        let link = r.resolve(&root, "/abs", false).unwrap();
        assert!(link.is_symlink());
        let target = r.resolve(&root, "/abs", true).unwrap();
        assert!(!target.is_symlink());
    }

    #[test]
    fn test_symlink_loop() {
        let root = tree();
        let r = Resolver::new(&root, MAX_SYMLINK_EXPANSIONS);
        assert!(matches!(
            r.resolve(&root, "/loop", true),
            Err(VfsError::SymlinkLoop(_))
        ));
        // Not followed in final position
        assert!(r.resolve(&root, "/loop", false).is_ok());
    }

    #[test]
    fn test_wrong_type_and_missing() {
        let root = tree();
        let r = Resolver::new(&root, MAX_SYMLINK_EXPANSIONS);
        assert!(matches!(
            r.resolve(&root, "/usr/bin/sh/x", true),
            Err(VfsError::NotADirectory(_))
        ));
        assert!(matches!(
            r.resolve(&root, "/usr/bin/sh/", true),
            Err(VfsError::NotADirectory(_))
        ));
        assert!(matches!(
            r.resolve(&root, "/usr/nope", true),
            Err(VfsError::NotFound(_))
        ));
        assert!(matches!(r.resolve(&root, "", true), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_relative_from_cwd() {
        let root = tree();
        let r = Resolver::new(&root, MAX_SYMLINK_EXPANSIONS);
        let usr = r.resolve(&root, "/usr", true).unwrap();
        let sh = r.resolve(&usr, "bin/sh", true).unwrap();
        assert_eq!(sh.name().as_str(), "sh");
        let back = r.resolve(&usr, "..", true).unwrap();
        assert!(Arc::ptr_eq(&back, &root));
    }

    #[test]
    fn test_resolve_parent() {
        let root = tree();
        let r = Resolver::new(&root, MAX_SYMLINK_EXPANSIONS);
        let lookup = r.resolve_parent(&root, "/bin/new/").unwrap();
        assert_eq!(lookup.dir.path().unwrap(), "/usr/bin");
        assert_eq!(lookup.name.as_str(), "new");
        assert!(lookup.trailing_slash);
        assert!(r.resolve_parent(&root, "/usr/..").is_err());
        assert!(r.resolve_parent(&root, "/").is_err());
    }
}
