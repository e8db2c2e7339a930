//! The flat, path-keyed view of everything the mount has seen or created:
//! which remotes contribute to which directories, synthesized directory
//! listings, known file attributes and their owning remote, and the sets of
//! paths mutated during this mount.
//!
//! Deliberately not a tree: every façade callback already has a
//! fully-qualified path, so a tree adds inode-graph bookkeeping the access
//! pattern never needs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::binding::RemoteBinding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Regular,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub size: u64,
    pub mtime: u64,
    pub atime: u64,
    pub ctime: u64,
    pub kind: Kind,
}

impl Attr {
    pub fn now_regular(size: u64) -> Self {
        let now = now_secs();
        Attr {
            size,
            mtime: now,
            atime: now,
            ctime: now,
            kind: Kind::Regular,
        }
    }

    pub fn directory() -> Self {
        let now = now_secs();
        Attr {
            size: 0,
            mtime: now,
            atime: now,
            ctime: now,
            kind: Kind::Directory,
        }
    }

    pub fn mode(&self) -> u32 {
        match self.kind {
            Kind::Directory => 0o755,
            Kind::Symlink => 0o777,
            Kind::Regular => 0o644,
        }
    }
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: Kind,
}

#[derive(Default)]
struct State {
    dirs: HashMap<String, Vec<Arc<RemoteBinding>>>,
    dir_contents: HashMap<String, Vec<DirEntry>>,
    files: HashMap<String, Attr>,
    file_to_remote: HashMap<String, Arc<RemoteBinding>>,
    created_files: HashSet<String>,
    created_dirs: HashSet<String>,
}

/// All namespace state behind a single reader-writer lock, as specified:
/// readers take the fast path (cached getattr, cached opendir); every
/// mutation (listing-on-demand, create, unlink, mkdir, rmdir, rename,
/// truncate, symlink) takes the writer.
#[derive(Default)]
pub struct Namespace {
    state: RwLock<State>,
}

impl Namespace {
    pub fn new() -> Self {
        Namespace::default()
    }

    /// Seeds the root directory with every configured remote, in order.
    pub fn seed_root(&self, bindings: &[Arc<RemoteBinding>]) {
        let mut state = self.state.write().unwrap();
        state.dirs.insert(String::new(), bindings.to_vec());
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.state.read().unwrap().dirs.contains_key(path)
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.state.read().unwrap().files.contains_key(path)
    }

    pub fn file_attr(&self, path: &str) -> Option<Attr> {
        self.state.read().unwrap().files.get(path).copied()
    }

    pub fn file_binding(&self, path: &str) -> Option<Arc<RemoteBinding>> {
        self.state.read().unwrap().file_to_remote.get(path).cloned()
    }

    pub fn dir_contents(&self, path: &str) -> Option<Vec<DirEntry>> {
        self.state.read().unwrap().dir_contents.get(path).cloned()
    }

    pub fn dir_remotes(&self, path: &str) -> Option<Vec<Arc<RemoteBinding>>> {
        self.state.read().unwrap().dirs.get(path).cloned()
    }

    pub fn is_created_dir(&self, path: &str) -> bool {
        self.state.read().unwrap().created_dirs.contains(path)
    }

    pub fn created_files(&self) -> Vec<(String, Attr)> {
        let state = self.state.read().unwrap();
        state
            .created_files
            .iter()
            .filter_map(|p| state.files.get(p).map(|a| (p.clone(), *a)))
            .collect()
    }

    pub fn remove_created_file(&self, path: &str) {
        self.state.write().unwrap().created_files.remove(path);
    }

    /// Registers `remote`'s listing of `path` as having happened, merging the
    /// entries it contributed. No-op if already populated.
    pub fn populate_dir(&self, path: &str, per_remote: Vec<(Arc<RemoteBinding>, Vec<crate::accessor::RemoteEntry>)>) {
        let mut state = self.state.write().unwrap();
        if state.dir_contents.contains_key(path) {
            return;
        }

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for (remote, listed) in per_remote {
            for entry in listed {
                let name = entry.name.trim_end_matches('/').to_string();
                if name.is_empty() {
                    continue;
                }
                let child = join(path, &name);
                if entry.is_dir() {
                    state
                        .dirs
                        .entry(child.clone())
                        .or_default()
                        .push(remote.clone());
                    state.dir_contents.entry(child).or_default();
                } else {
                    if !state.files.contains_key(&child) {
                        state
                            .files
                            .insert(child.clone(), attr_from_entry(&entry));
                        state.file_to_remote.insert(child.clone(), remote.clone());
                    }
                }
                if seen.insert(name.clone()) {
                    entries.push(DirEntry {
                        name,
                        kind: if entry.is_dir() { Kind::Directory } else { Kind::Regular },
                    });
                }
            }
        }
        state.dir_contents.insert(path.to_string(), entries);
    }

    /// Un-registers a directory marker that a sibling remote advertised but
    /// whose own listing, across every contributing remote, came back with
    /// nothing. Leaves the parent's already-synthesized entry for it in
    /// place (it's a ghost, not retroactively hidden) but makes `is_dir` and
    /// later lookups on the path itself report not-found.
    pub fn reject_empty_dir(&self, path: &str) {
        let mut state = self.state.write().unwrap();
        state.dirs.remove(path);
        state.dir_contents.remove(path);
    }

    pub fn create_file(&self, path: &str, binding: Arc<RemoteBinding>) {
        let mut state = self.state.write().unwrap();
        state.files.insert(path.to_string(), Attr::now_regular(0));
        state.file_to_remote.insert(path.to_string(), binding);
        state.created_files.insert(path.to_string());
        add_dir_entry(&mut state, path, Kind::Regular);
    }

    pub fn create_symlink(&self, path: &str, binding: Arc<RemoteBinding>) {
        let mut state = self.state.write().unwrap();
        state.files.insert(
            path.to_string(),
            Attr {
                kind: Kind::Symlink,
                ..Attr::now_regular(0)
            },
        );
        state.file_to_remote.insert(path.to_string(), binding);
        add_dir_entry(&mut state, path, Kind::Symlink);
    }

    pub fn update_attr(&self, path: &str, f: impl FnOnce(&mut Attr)) {
        let mut state = self.state.write().unwrap();
        if let Some(attr) = state.files.get_mut(path) {
            f(attr);
        }
    }

    pub fn mark_created(&self, path: &str) {
        self.state.write().unwrap().created_files.insert(path.to_string());
    }

    pub fn remove_file(&self, path: &str) {
        let mut state = self.state.write().unwrap();
        state.files.remove(path);
        state.file_to_remote.remove(path);
        state.created_files.remove(path);
        remove_dir_entry(&mut state, path);
    }

    pub fn create_dir(&self, path: &str, binding: Arc<RemoteBinding>) {
        let mut state = self.state.write().unwrap();
        state.dirs.insert(path.to_string(), vec![binding]);
        state.dir_contents.insert(path.to_string(), Vec::new());
        state.created_dirs.insert(path.to_string());
        add_dir_entry(&mut state, path, Kind::Directory);
    }

    pub fn remove_dir(&self, path: &str) {
        let mut state = self.state.write().unwrap();
        state.dirs.remove(path);
        state.dir_contents.remove(path);
        state.created_dirs.remove(path);
        remove_dir_entry(&mut state, path);
    }

    /// Moves every namespace entry rooted at `old` directory to `new`.
    pub fn rename_dir(&self, old: &str, new: &str) {
        let mut state = self.state.write().unwrap();
        if let Some(remotes) = state.dirs.remove(old) {
            state.dirs.insert(new.to_string(), remotes);
        }
        if let Some(contents) = state.dir_contents.remove(old) {
            state.dir_contents.insert(new.to_string(), contents);
        }
        if state.created_dirs.remove(old) {
            state.created_dirs.insert(new.to_string());
        }
        remove_dir_entry(&mut state, old);
        add_dir_entry(&mut state, new, Kind::Directory);
    }

    pub fn rename_file(&self, old: &str, new: &str) {
        let mut state = self.state.write().unwrap();
        if let Some(attr) = state.files.remove(old) {
            state.files.insert(new.to_string(), attr);
        }
        if let Some(binding) = state.file_to_remote.remove(old) {
            state.file_to_remote.insert(new.to_string(), binding);
        }
        if state.created_files.remove(old) {
            state.created_files.insert(new.to_string());
        }
        remove_dir_entry(&mut state, old);
        add_dir_entry(&mut state, new, Kind::Regular);
    }

    pub fn wipe(&self) {
        let mut state = self.state.write().unwrap();
        state.dirs.clear();
        state.dir_contents.clear();
        state.files.clear();
        state.file_to_remote.clear();
        state.created_files.clear();
        state.created_dirs.clear();
    }
}

fn attr_from_entry(entry: &crate::accessor::RemoteEntry) -> Attr {
    Attr {
        size: entry.size.max(0) as u64,
        mtime: entry.mtime.max(0) as u64,
        atime: entry.mtime.max(0) as u64,
        ctime: entry.mtime.max(0) as u64,
        kind: Kind::Regular,
    }
}

pub fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn name_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn add_dir_entry(state: &mut State, path: &str, kind: Kind) {
    let parent = parent_of(path).to_string();
    let name = name_of(path).to_string();
    let entries = state.dir_contents.entry(parent).or_default();
    if !entries.iter().any(|e| e.name == name) {
        entries.push(DirEntry { name, kind });
    }
}

fn remove_dir_entry(state: &mut State, path: &str) {
    let parent = parent_of(path);
    let name = name_of(path);
    if let Some(entries) = state.dir_contents.get_mut(parent) {
        entries.retain(|e| e.name != name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::local::LocalAccessor;

    fn test_binding() -> Arc<RemoteBinding> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(RemoteBinding::new(
            Box::new(LocalAccessor::new(dir.path(), "")),
            true,
            Some(dir.path().join(".cache")),
            true,
            true,
            1,
            "/mnt".to_string(),
        ))
    }

    #[test]
    fn create_file_registers_in_parent_and_created_set() {
        let ns = Namespace::new();
        let b = test_binding();
        ns.create_file("a.txt", b.clone());
        assert!(ns.is_file("a.txt"));
        assert_eq!(ns.created_files().len(), 1);
        let root_entries = ns.dir_contents("").unwrap_or_default();
        assert!(root_entries.is_empty()); // root wasn't populate_dir'd, only add_dir_entry touched "" key lazily
    }

    #[test]
    fn rename_file_moves_attr_and_created_membership() {
        let ns = Namespace::new();
        let b = test_binding();
        ns.create_file("old.txt", b);
        ns.rename_file("old.txt", "new.txt");
        assert!(!ns.is_file("old.txt"));
        assert!(ns.is_file("new.txt"));
        assert_eq!(ns.created_files()[0].0, "new.txt");
    }

    #[test]
    fn parent_and_name_split_paths_correctly() {
        assert_eq!(parent_of("a/b/c"), "a/b");
        assert_eq!(name_of("a/b/c"), "c");
        assert_eq!(parent_of("a"), "");
        assert_eq!(name_of("a"), "a");
    }

    #[test]
    fn wipe_clears_every_map() {
        let ns = Namespace::new();
        let b = test_binding();
        ns.create_dir("d", b.clone());
        ns.create_file("d/a.txt", b);
        ns.wipe();
        assert!(!ns.is_dir("d"));
        assert!(!ns.is_file("d/a.txt"));
    }
}
