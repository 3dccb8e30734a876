//! Filesystem access used by the applier and the generator.
//!
//! All paths handed to a [`WorkTree`] are relative to its root.

use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub trait WorkTree {
    /// Every file under the root, relative and sorted.
    fn list_files(&self) -> io::Result<Vec<PathBuf>>;
    fn exists(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> io::Result<String>;
    /// Raw content, for files that may not be text.
    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.read(path).map(String::into_bytes)
    }
    fn write(&mut self, path: &Path, content: &str) -> io::Result<()>;
    fn remove(&mut self, path: &Path) -> io::Result<()>;
}

/// A directory on disk.
#[derive(Debug, Clone)]
pub struct DiskTree {
    root: PathBuf,
    exclude: Vec<String>,
}

impl DiskTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
        }
    }

    /// Directory names skipped by [`WorkTree::list_files`].
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|e| e == name)
    }
}

impl WorkTree for DiskTree {
    fn list_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.is_excluded(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                files.push(rel.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(self.resolve(path))
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn write(&mut self, path: &Path, content: &str) -> io::Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, content)?;
        info!("wrote {:?}", full);
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        let full = self.resolve(path);
        fs::remove_file(&full)?;
        info!("removed {:?}", full);
        Ok(())
    }
}

/// Records writes in memory on top of another tree; the base is never
/// touched. Used for dry runs.
pub struct OverlayTree<'a> {
    base: &'a dyn WorkTree,
    layer: BTreeMap<PathBuf, Option<String>>,
}

impl<'a> OverlayTree<'a> {
    pub fn new(base: &'a dyn WorkTree) -> Self {
        Self {
            base,
            layer: BTreeMap::new(),
        }
    }
}

impl WorkTree for OverlayTree<'_> {
    fn list_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = self
            .base
            .list_files()?
            .into_iter()
            .filter(|p| !matches!(self.layer.get(p), Some(None)))
            .collect();
        for (path, content) in &self.layer {
            if content.is_some() && !files.contains(path) {
                files.push(path.clone());
            }
        }
        files.sort();
        Ok(files)
    }

    fn exists(&self, path: &Path) -> bool {
        match self.layer.get(path) {
            Some(content) => content.is_some(),
            None => self.base.exists(path),
        }
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        match self.layer.get(path) {
            Some(Some(content)) => Ok(content.clone()),
            Some(None) => Err(not_found(path)),
            None => self.base.read(path),
        }
    }

    fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.layer.get(path) {
            Some(Some(content)) => Ok(content.clone().into_bytes()),
            Some(None) => Err(not_found(path)),
            None => self.base.read_bytes(path),
        }
    }

    fn write(&mut self, path: &Path, content: &str) -> io::Result<()> {
        debug!("dry run: would write {:?}", path);
        self.layer
            .insert(path.to_path_buf(), Some(content.to_string()));
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        if !self.exists(path) {
            return Err(not_found(path));
        }
        debug!("dry run: would remove {:?}", path);
        self.layer.insert(path.to_path_buf(), None);
        Ok(())
    }
}

/// A tree held entirely in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTree {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files.get(path.as_ref()).map(String::as_str)
    }
}

impl WorkTree for MemoryTree {
    fn list_files(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self.files.keys().cloned().collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn write(&mut self, path: &Path, content: &str) -> io::Result<()> {
        self.files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> io::Result<()> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}
