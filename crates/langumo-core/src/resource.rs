//! Disk-backed resources and the scoped manager that owns them
//!
//! Every intermediate result of a build lives in a file under the manager's
//! workspace directory. Nothing is reference counted: each registered
//! resource carries the scope depth (generation) it belongs to and a lock
//! flag, and [`ResourceManager::purge`] is the only thing that deletes.
//!
//! ```text
//! generation 0   run()
//! generation 1   └── Chain          purge after every stage
//! generation 2       └── Chain      (nested, e.g. a Parallel group)
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::BuildError;

/// Buffer size for resource readers and writers.
const IO_BUFFER: usize = 1 << 20;

/// Handle to a file passed between stages.
///
/// Cloning a handle does not copy the file. Handles created by a
/// [`ResourceManager`] carry an id; imported handles do not and are never
/// deleted by anyone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    id: Option<u64>,
    path: PathBuf,
}

impl Resource {
    /// Wrap an external file. The manager never owns it.
    pub fn external(path: impl Into<PathBuf>) -> Self {
        Self {
            id: None,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used for log lines.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn is_external(&self) -> bool {
        self.id.is_none()
    }

    /// Buffered reader over the whole file.
    pub fn open(&self) -> io::Result<BufReader<File>> {
        Ok(BufReader::with_capacity(IO_BUFFER, File::open(&self.path)?))
    }

    /// Buffered writer that truncates the file.
    pub fn create(&self) -> io::Result<BufWriter<File>> {
        Ok(BufWriter::with_capacity(IO_BUFFER, File::create(&self.path)?))
    }

    /// Size of the file in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

#[derive(Debug)]
struct Entry {
    resource: Resource,
    generation: usize,
    locked: bool,
}

/// Owner of a workspace directory and of every resource created in it.
///
/// Only the controlling thread talks to the manager; stages that spawn
/// workers create their resources before the workers start.
#[derive(Debug)]
pub struct ResourceManager {
    workspace: PathBuf,
    entries: BTreeMap<u64, Entry>,
    next_id: u64,
    generation: usize,
    closed: bool,
}

impl ResourceManager {
    /// Claim `workspace`, which must not exist yet.
    ///
    /// Refusing an existing directory guarantees `close()` only ever removes
    /// files this manager made.
    pub fn new(workspace: &Path) -> Result<Self> {
        if workspace.exists() {
            return Err(BuildError::Workspace(format!(
                "{} already exists",
                workspace.display()
            ))
            .into());
        }
        fs::create_dir_all(workspace)
            .with_context(|| format!("failed to create workspace: {}", workspace.display()))?;
        log::debug!("workspace: {}", workspace.display());
        Ok(Self {
            workspace: workspace.to_path_buf(),
            entries: BTreeMap::new(),
            next_id: 0,
            generation: 0,
            closed: false,
        })
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Current scope depth.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Number of registered (not yet purged) resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Create an empty file tagged with the current generation.
    pub fn create(&mut self) -> Result<Resource> {
        let id = self.next_id;
        self.next_id += 1;

        let path = self.workspace.join(format!("aux-{id:06}"));
        File::create(&path)
            .with_context(|| format!("failed to create resource: {}", path.display()))?;

        let resource = Resource { id: Some(id), path };
        self.entries.insert(
            id,
            Entry {
                resource: resource.clone(),
                generation: self.generation,
                locked: false,
            },
        );
        Ok(resource)
    }

    /// Whether `resource` may be handed to the next stage: external files
    /// always, managed ones only while still registered here.
    pub fn contains(&self, resource: &Resource) -> bool {
        match resource.id {
            None => true,
            Some(id) => self
                .entries
                .get(&id)
                .is_some_and(|e| e.resource == *resource),
        }
    }

    /// Generation of a registered resource; `None` for external or purged ones.
    pub fn generation_of(&self, resource: &Resource) -> Option<usize> {
        self.entry(resource).map(|e| e.generation)
    }

    pub fn is_locked(&self, resource: &Resource) -> bool {
        self.entry(resource).is_some_and(|e| e.locked)
    }

    pub fn enter_scope(&mut self) {
        self.generation += 1;
    }

    pub fn exit_scope(&mut self) {
        debug_assert!(self.generation > 0, "exit_scope without enter_scope");
        self.generation = self.generation.saturating_sub(1);
    }

    /// Run `f` one generation deeper; the scope is left even when `f` fails.
    pub fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.enter_scope();
        let result = f(self);
        self.exit_scope();
        result
    }

    /// Keep `resource` through the next purge.
    ///
    /// Only resources the next purge could delete (current generation or
    /// deeper) are flagged. Enclosing-scope and external resources are left
    /// alone.
    pub fn lock(&mut self, resource: &Resource) {
        let current = self.generation;
        if let Some(entry) = self.entry_mut(resource) {
            if entry.generation >= current {
                entry.locked = true;
            }
        }
    }

    pub fn lock_all(&mut self, resources: &[Resource]) {
        for r in resources {
            self.lock(r);
        }
    }

    /// Move resources created in deeper scopes into the current one, so the
    /// current scope's purge cycle governs them from now on.
    pub fn adopt(&mut self, resources: &[Resource]) {
        let current = self.generation;
        for r in resources {
            if let Some(entry) = self.entry_mut(r) {
                if entry.generation > current {
                    entry.generation = current;
                }
            }
        }
    }

    /// Reject outputs that are not live resources of this manager.
    pub fn validate(&self, stage: &str, outputs: &[Resource]) -> Result<()> {
        for r in outputs {
            if !self.contains(r) {
                return Err(BuildError::Shape {
                    stage: stage.to_string(),
                    detail: format!("{} is not a live resource of this build", r.name()),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Delete every unlocked resource at the current generation or deeper.
    /// Locked ones survive and lose their lock.
    ///
    /// Returns the number of deleted resources.
    pub fn purge(&mut self) -> Result<usize> {
        let current = self.generation;
        let mut doomed = Vec::new();

        for (id, entry) in self.entries.iter_mut() {
            if entry.generation < current {
                continue;
            }
            if entry.locked {
                entry.locked = false;
            } else {
                doomed.push(*id);
            }
        }

        for id in &doomed {
            if let Some(entry) = self.entries.remove(id) {
                remove_file_if_exists(entry.resource.path())?;
            }
        }

        if !doomed.is_empty() {
            log::debug!(
                "purged {} resources at generation {current} ({} remain)",
                doomed.len(),
                self.entries.len()
            );
        }
        Ok(doomed.len())
    }

    /// Remove the workspace directory with everything still in it.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.entries.clear();
        log::debug!("removing workspace {}", self.workspace.display());
        match fs::remove_dir_all(&self.workspace) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("failed to remove workspace: {}", self.workspace.display())
            }),
        }
    }

    fn entry(&self, resource: &Resource) -> Option<&Entry> {
        let id = resource.id?;
        self.entries.get(&id).filter(|e| e.resource == *resource)
    }

    fn entry_mut(&mut self, resource: &Resource) -> Option<&mut Entry> {
        let id = resource.id?;
        self.entries
            .get_mut(&id)
            .filter(|e| e.resource == *resource)
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.workspace) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!(
                    "failed to remove workspace {}: {e}",
                    self.workspace.display()
                );
            }
        }
    }
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
