//! Temporary directory bookkeeping for multi-pass algorithms

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Owns a temporary directory together with the files and subdirectories created in it.
/// Everything is removed when the manager is dropped or [`FileManager::delete`]d.
pub struct FileManager {
    // Declared before `dir` so nested managers are dropped first
    directories: Vec<FileManager>,
    files: Vec<PathBuf>,
    dir: TempDir,
}

impl FileManager {
    /// New temporary directory under the system temp location
    pub fn create_temp_directory(prefix: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        Ok(Self::from_dir(dir))
    }

    /// New temporary directory under `parent`
    pub fn create_temp_directory_in(parent: &Path, prefix: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(parent)?;
        Ok(Self::from_dir(dir))
    }

    fn from_dir(dir: TempDir) -> Self {
        tracing::debug!("Created temporary directory {}", dir.path().display());
        Self {
            directories: Vec::new(),
            files: Vec::new(),
            dir,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Empty file named `<prefix><random>`
    pub fn create_temp_file(&mut self, prefix: &str) -> io::Result<PathBuf> {
        self.create_temp_file_with_suffix(prefix, "")
    }

    pub fn create_temp_file_with_suffix(&mut self, prefix: &str, suffix: &str) -> io::Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(self.dir.path())?;
        let (_, path): (File, PathBuf) = file.keep()?;
        self.files.push(path.clone());
        Ok(path)
    }

    /// Nested managed directory, removed together with this one
    pub fn create_temp_dir_inside(&mut self, prefix: &str) -> io::Result<&mut FileManager> {
        let nested = FileManager::create_temp_directory_in(self.dir.path(), prefix)?;
        self.directories.push(nested);
        let last = self.directories.len() - 1;
        Ok(&mut self.directories[last])
    }

    /// Files created directly in this directory
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Files created here and in every nested directory
    pub fn all_files(&self) -> Vec<PathBuf> {
        let mut all = self.files.clone();
        for nested in &self.directories {
            all.extend(nested.all_files());
        }
        all
    }

    pub fn directories(&self) -> Vec<&Path> {
        self.directories.iter().map(FileManager::path).collect()
    }

    pub fn all_directories(&self) -> Vec<PathBuf> {
        let mut all = Vec::new();
        for nested in &self.directories {
            all.push(nested.path().to_path_buf());
            all.extend(nested.all_directories());
        }
        all
    }

    /// Remove the directory tree now, reporting failures
    pub fn delete(self) -> io::Result<()> {
        let FileManager { directories, dir, .. } = self;
        drop(directories);
        dir.close()
    }
}
