/*!
 * Dynamic Group
 * Directory whose children are synthesized on demand from a live collection
 */

use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::core::data_structures::InlineString;
use crate::core::types::NodeId;
use crate::vfs::node::NodeRef;
use crate::vfs::traits::{DirIter, NodeOps};
use crate::vfs::types::*;

/// Source of synthesized children
///
/// Keys identify members of a live collection (pids, descriptors, handles).
/// `keys` is a snapshot; the group never holds a live cursor into the
/// collection, so a generator may be consulted while its collection changes.
pub trait Generator: Send + Sync {
    /// Current keys, in listing order
    fn keys(&self) -> Vec<u64>;

    /// Parse a child name into a key
    ///
    /// The default syntax is canonical decimal: no sign, no leading zeros.
    fn parse(&self, name: &str) -> Option<u64> {
        parse_canonical_decimal(name)
    }

    /// Child name for a key (inverse of `parse`)
    fn name(&self, key: u64) -> InlineString {
        InlineString::from(key.to_string())
    }

    /// Type reported for the child during iteration
    fn entry_type(&self, _key: u64) -> FileType {
        FileType::Directory
    }

    /// Build the child bound to `key`, or NotFound if the key is not live
    fn materialize(&self, parent: &NodeRef, key: u64, id: NodeId) -> VfsResult<NodeRef>;
}

/// Canonical decimal parse shared by numeric generators
pub(crate) fn parse_canonical_decimal(name: &str) -> Option<u64> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return None;
    }
    name.parse().ok()
}

/// Generator-backed directory, optionally with fixed entries listed first
pub struct DynamicGroup {
    fixed: RwLock<BTreeMap<InlineString, NodeRef>>,
    generator: Arc<dyn Generator>,
    created: SystemTime,
}

impl DynamicGroup {
    pub fn new(generator: impl Generator + 'static) -> Self {
        Self {
            fixed: RwLock::new(BTreeMap::new()),
            generator: Arc::new(generator),
            created: SystemTime::now(),
        }
    }

    /// Add a fixed entry that shadows any generated name
    pub fn attach(&self, this: &NodeRef, name: &str, node: NodeRef) {
        node.set_parent(this, name);
        self.fixed.write().insert(InlineString::from(name), node);
    }
}

impl NodeOps for DynamicGroup {
    fn lookup(&self, this: &NodeRef, name: &str) -> VfsResult<NodeRef> {
        if let Some(node) = self.fixed.read().get(name) {
            return Ok(Arc::clone(node));
        }
        let key = self
            .generator
            .parse(name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        self.generator
            .materialize(this, key, NodeId::derived(this.id(), key))
    }

    fn iterate(&self, this: &NodeRef) -> VfsResult<DirIter> {
        let fixed: Vec<Entry> = self
            .fixed
            .read()
            .iter()
            .map(|(name, node)| Entry::new(node.id(), name.clone(), node.file_type()))
            .collect();
        let keys = self.generator.keys();
        let generator = Arc::clone(&self.generator);
        let parent = this.id();
        let generated = keys.into_iter().map(move |key| {
            Entry::new(
                NodeId::derived(parent, key),
                generator.name(key),
                generator.entry_type(key),
            )
        });
        Ok(DirIter::new(fixed.into_iter().chain(generated)))
    }

    fn metadata(&self, this: &NodeRef) -> VfsResult<Metadata> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::node::{Node, NodeKind};
    use crate::vfs::providers::Symlink;
    use parking_lot::Mutex;

    struct Numbers(Arc<Mutex<Vec<u64>>>);

    impl Generator for Numbers {
        fn keys(&self) -> Vec<u64> {
            self.0.lock().clone()
        }

        fn entry_type(&self, _key: u64) -> FileType {
            FileType::Symlink
        }

        fn materialize(&self, parent: &NodeRef, key: u64, id: NodeId) -> VfsResult<NodeRef> {
            if !self.0.lock().contains(&key) {
                return Err(VfsError::NotFound(key.to_string()));
            }
            Ok(Node::with_id(
                id,
                NodeKind::Symlink,
                key.to_string(),
                Some(parent),
                Symlink::fixed(format!("/n/{}", key)),
            ))
        }
    }

    #[test]
    fn test_canonical_decimal() {
        assert_eq!(parse_canonical_decimal("42"), Some(42));
        assert_eq!(parse_canonical_decimal("0"), Some(0));
        assert_eq!(parse_canonical_decimal("042"), None);
        assert_eq!(parse_canonical_decimal("+4"), None);
        assert_eq!(parse_canonical_decimal(""), None);
    }

    #[test]
    fn test_lookup_synthesizes_stable_ids() {
        let live = Arc::new(Mutex::new(vec![3, 7]));
        let group = Node::new(NodeKind::DynamicGroup, "n", None, DynamicGroup::new(Numbers(Arc::clone(&live))));

        let a = group.lookup("7").unwrap();
        let b = group.lookup("7").unwrap();
        assert_eq!(a.id(), b.id());
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.read_link().unwrap(), "/n/7");
        assert!(matches!(group.lookup("8"), Err(VfsError::NotFound(_))));
        assert!(matches!(group.lookup("07"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_iteration_is_a_snapshot() {
        let live = Arc::new(Mutex::new(vec![1, 2, 3]));
        let group = Node::new(NodeKind::DynamicGroup, "n", None, DynamicGroup::new(Numbers(Arc::clone(&live))));

        let mut iter = group.iterate().unwrap();
        assert_eq!(iter.next().unwrap().name.as_str(), "1");
        live.lock().retain(|k| *k != 2);
        let rest: Vec<String> = iter.map(|e| e.name.to_string()).collect();
        assert_eq!(rest, vec!["2", "3"]);
    }

    #[test]
    fn test_fixed_entries_listed_first() {
        let group = Node::new(NodeKind::DynamicGroup, "n", None, DynamicGroup::new(Numbers(Arc::new(Mutex::new(vec![5])))));
        let link = Node::new(NodeKind::Symlink, "self", None, Symlink::fixed("5"));
        group.provider::<DynamicGroup>().unwrap().attach(&group, "self", link);

        let names: Vec<String> = group.iterate().unwrap().map(|e| e.name.to_string()).collect();
        assert_eq!(names, vec!["self", "5"]);
        assert!(Arc::ptr_eq(&group.lookup("self").unwrap().parent().unwrap(), &group));
    }
}
