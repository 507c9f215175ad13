use std::{
    fmt::{self, Display, Formatter},
    path::{Path, PathBuf},
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FileId(pub usize);

/// Location of a token or line. Lines and columns are 1-based.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SourceLoc {
    pub file: FileId,
    pub line: usize,
    pub column: usize,
}

impl SourceLoc {
    #[inline]
    pub fn new(file: FileId, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }
}

impl Display for SourceLoc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self { file, line, column } = self;
        write!(f, "<{}>:{line}:{column}", file.0)
    }
}

#[derive(Clone, Debug)]
pub struct SourceFile {
    path: PathBuf,
    included_from: Option<FileId>,
    includes: Vec<FileId>,
}

impl SourceFile {
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Every file that took part in a compilation, in the order they were opened.
#[derive(Default, Debug)]
pub struct SourceFiles {
    files: Vec<SourceFile>,
}

impl SourceFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the root file of a compilation.
    pub fn insert_root<P: AsRef<Path>>(&mut self, path: P) -> FileId {
        self.push(path.as_ref().to_path_buf(), None)
    }

    /// Registers `path` as included by `parent`. Returns `None` when `parent`
    /// already includes that file.
    pub fn insert_include<P: AsRef<Path>>(&mut self, parent: FileId, path: P) -> Option<FileId> {
        let path = path.as_ref();
        let already = self.files[parent.0]
            .includes
            .iter()
            .any(|id| self.files[id.0].path == path);
        if already {
            return None;
        }
        let id = self.push(path.to_path_buf(), Some(parent));
        self.files[parent.0].includes.push(id);
        Some(id)
    }

    /// Tests if `path` is `file` itself or one of the files that include it.
    pub fn is_ancestor<P: AsRef<Path>>(&self, file: FileId, path: P) -> bool {
        let path = path.as_ref();
        let mut current = Some(file);
        while let Some(id) = current {
            let source = &self.files[id.0];
            if source.path == path {
                return true;
            }
            current = source.included_from;
        }
        false
    }

    #[inline]
    pub fn get(&self, file: FileId) -> Option<&SourceFile> {
        self.files.get(file.0)
    }

    #[inline]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|file| file.path.clone()).collect()
    }

    fn push(&mut self, path: PathBuf, included_from: Option<FileId>) -> FileId {
        let id = FileId(self.files.len());
        self.files.push(SourceFile {
            path,
            included_from,
            includes: Vec::new(),
        });
        id
    }
}
