use std::{
    fs::{self, File},
    io::{self, Read},
    iter,
    path::{Path, PathBuf},
};

use path_absolutize::Absolutize;

pub trait FileSystem {
    type Reader: Read;

    fn is_dir(&self, path: &Path) -> io::Result<bool>;
    fn is_file(&self, path: &Path) -> io::Result<bool>;
    fn open_read(&self, path: &Path) -> io::Result<Self::Reader>;
}

pub struct RealFileSystem;

impl RealFileSystem {
    #[inline]
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RealFileSystem {
    type Reader = File;

    #[inline]
    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[inline]
    fn is_file(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[inline]
    fn open_read(&self, path: &Path) -> io::Result<Self::Reader> {
        File::open(path)
    }
}

/// Resolves `#include` and `.includebin` paths. A relative path is tried
/// against the including file's directory first, then each search path in
/// the order they were added.
pub struct FileManager<S> {
    file_system: S,
    search_paths: Vec<PathBuf>,
}

impl<S: FileSystem> FileManager<S> {
    #[inline]
    pub fn new(file_system: S) -> Self {
        Self {
            file_system,
            search_paths: Vec::new(),
        }
    }

    pub fn add_search_path<C: AsRef<Path>, P: AsRef<Path>>(
        &mut self,
        cwd: C,
        path: P,
    ) -> io::Result<PathBuf> {
        let path = path.as_ref().absolutize_from(cwd.as_ref())?.to_path_buf();
        if !self.file_system.is_dir(&path)? {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("\"{}\" is not a directory", path.display()),
            ));
        }
        self.search_paths.push(path.clone());
        Ok(path)
    }

    #[inline]
    pub fn absolute<C: AsRef<Path>, P: AsRef<Path>>(&self, cwd: C, path: P) -> io::Result<PathBuf> {
        Ok(path.as_ref().absolutize_from(cwd.as_ref())?.to_path_buf())
    }

    pub fn search<D: AsRef<Path>, P: AsRef<Path>>(
        &self,
        dir: D,
        path: P,
    ) -> io::Result<Option<PathBuf>> {
        let dir = dir.as_ref().to_path_buf();
        for dir in iter::once(&dir).chain(&self.search_paths) {
            let candidate = dir.join(path.as_ref()).absolutize()?.to_path_buf();
            if self.file_system.is_file(&candidate)? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    pub fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let mut reader = self.file_system.open_read(path)?;
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(text)
    }

    pub fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        let mut reader = self.file_system.open_read(path)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
