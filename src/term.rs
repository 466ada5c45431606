//! The working-directory shell layer: path-addressed operations over
//! the directory layer. A `Terminal` owns the file system value plus a
//! current working directory, and maps engine errors one-to-one; it
//! adds no state of its own beyond the cwd.

use itertools::{Itertools, Position};
use log::debug;
use scopeguard::ScopeGuard;

use crate::error::{FsError, Result};
use crate::fs::{FileSystem, Ino};
use crate::inode::{FileName, InodeType, Perm};
use crate::param::ROOTINO;
use crate::path::Path;

/// One row of a directory listing.
#[derive(Clone, Debug)]
pub struct Entry {
    pub ino: Ino,
    pub name: FileName,
    pub typ: InodeType,
    pub size: u64,
    pub perm: Perm,
}

pub struct Terminal {
    fs: FileSystem,
    cwd: Ino,
}

impl Terminal {
    pub fn new(fs: FileSystem) -> Terminal {
        Terminal { fs, cwd: ROOTINO }
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut FileSystem {
        &mut self.fs
    }

    pub fn into_fs(self) -> FileSystem {
        self.fs
    }

    pub fn cwd(&self) -> Ino {
        self.cwd
    }

    /// Resolve a path to an inode. `.` and `..` are ordinary entries.
    pub(crate) fn walk(&self, path: &Path) -> Result<Ino> {
        let mut cur = if path.is_absolute() { ROOTINO } else { self.cwd };
        let mut p = path;
        while let Some((rest, elem)) = p.skipelem() {
            let name = FileName::new(elem)?;
            cur = self.fs.dirlookup(cur, &name)?.0;
            p = rest;
        }
        Ok(cur)
    }

    /// Resolve everything but the last element. Returns the parent
    /// directory and the final name.
    fn walk_parent(&self, path: &Path) -> Result<(Ino, FileName)> {
        let mut cur = if path.is_absolute() { ROOTINO } else { self.cwd };
        let mut p = path;
        loop {
            let (rest, elem) = p.skipelem().ok_or(FsError::InvalidInput)?;
            let name = FileName::new(elem)?;
            if rest.is_empty() {
                return Ok((cur, name));
            }
            cur = self.fs.dirlookup(cur, &name)?.0;
            p = rest;
        }
    }

    /// Create an empty data file. Fails if the name is taken.
    pub fn new_file(&mut self, path: &str, perm: Perm) -> Result<Ino> {
        let (dir, name) = self.walk_parent(Path::new(path))?;
        if self.fs.dirlookup(dir, &name).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let ino = self.fs.claim_inode()?;
        let inode = self.fs.inode_mut(ino)?;
        inode.typ = InodeType::Data;
        inode.perm = perm;
        inode.name = name.clone();

        // The claim is undone if the directory cannot take the entry.
        let mut guard = scopeguard::guard((&mut self.fs, ino), |(fs, ino)| {
            let _ = fs.release_inode(ino);
        });
        let (fs, ino) = &mut *guard;
        fs.dirlink(dir, &name, *ino)?;
        let (_, ino) = ScopeGuard::into_inner(guard);
        debug!("new_file {} -> ino {}", path, ino);
        Ok(ino)
    }

    /// Create an empty directory with its `.` and `..` entries.
    pub fn new_directory(&mut self, path: &str) -> Result<Ino> {
        let (dir, name) = self.walk_parent(Path::new(path))?;
        if self.fs.dirlookup(dir, &name).is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let ino = self.fs.claim_inode()?;
        let inode = self.fs.inode_mut(ino)?;
        inode.typ = InodeType::Dir;
        inode.perm = Perm::all();
        inode.name = name.clone();

        // Undo both the claim and the dot entries if a later step runs
        // out of blocks.
        let mut guard = scopeguard::guard((&mut self.fs, ino), |(fs, ino)| {
            let _ = fs.release_data(ino);
            let _ = fs.release_inode(ino);
        });
        let (fs, guarded) = &mut *guard;
        fs.dirlink(*guarded, &FileName::new(".")?, *guarded)?;
        fs.dirlink(*guarded, &FileName::new("..")?, dir)?;
        fs.dirlink(dir, &name, *guarded)?;
        let (_, ino) = ScopeGuard::into_inner(guard);
        debug!("new_directory {} -> ino {}", path, ino);
        Ok(ino)
    }

    /// Unlink a data file and free its inode and blocks.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let (dir, name) = self.walk_parent(Path::new(path))?;
        let (ino, _) = self.fs.dirlookup(dir, &name)?;
        if self.fs.inode(ino)?.typ == InodeType::Dir {
            return Err(FsError::IsADirectory);
        }
        self.fs.dirunlink(dir, &name)?;
        self.fs.release_data(ino)?;
        self.fs.release_inode(ino)?;
        debug!("remove_file {}", path);
        Ok(())
    }

    /// Remove an empty directory. The root and the working directory
    /// stay.
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        let (dir, name) = self.walk_parent(Path::new(path))?;
        if name.as_bytes() == b"." || name.as_bytes() == b".." {
            return Err(FsError::InvalidInput);
        }
        let (ino, _) = self.fs.dirlookup(dir, &name)?;
        if self.fs.inode(ino)?.typ != InodeType::Dir {
            return Err(FsError::NotADirectory);
        }
        if ino == ROOTINO || ino == self.cwd {
            return Err(FsError::InvalidInput);
        }
        if !self.fs.is_dir_empty(ino)? {
            return Err(FsError::DirectoryNotEmpty);
        }
        self.fs.dirunlink(dir, &name)?;
        self.fs.release_data(ino)?;
        self.fs.release_inode(ino)?;
        debug!("remove_directory {}", path);
        Ok(())
    }

    pub fn change_directory(&mut self, path: &str) -> Result<()> {
        let ino = self.walk(Path::new(path))?;
        if self.fs.inode(ino)?.typ != InodeType::Dir {
            return Err(FsError::NotADirectory);
        }
        self.cwd = ino;
        Ok(())
    }

    /// The live entries of a directory, `.` and `..` included.
    pub fn list(&self, path: &str) -> Result<Vec<Entry>> {
        let dir = self.walk(Path::new(path))?;
        self.fs
            .read_dir(dir)?
            .into_iter()
            .map(|(ino, name)| {
                let inode = self.fs.inode(ino)?;
                Ok(Entry {
                    ino,
                    name,
                    typ: inode.typ,
                    size: inode.size,
                    perm: inode.perm,
                })
            })
            .collect()
    }

    /// Render the subtree under `path`, one name per line.
    pub fn tree(&self, path: &str) -> Result<String> {
        let ino = self.walk(Path::new(path))?;
        if self.fs.inode(ino)?.typ != InodeType::Dir {
            return Err(FsError::NotADirectory);
        }
        let mut out = String::new();
        out.push_str(&self.node_label(ino));
        out.push('\n');
        self.tree_dfs(ino, "", &mut out)?;
        Ok(out)
    }

    fn node_label(&self, ino: Ino) -> String {
        if ino == ROOTINO {
            "/".to_string()
        } else {
            self.fs.inodes.get(ino).name.to_string()
        }
    }

    fn tree_dfs(&self, dir: Ino, prefix: &str, out: &mut String) -> Result<()> {
        let children = self
            .fs
            .read_dir(dir)?
            .into_iter()
            .filter(|(_, name)| name.as_bytes() != b"." && name.as_bytes() != b"..")
            .collect::<Vec<_>>();
        for child in children.into_iter().with_position() {
            let (glyph, indent) = match child {
                Position::Last(_) | Position::Only(_) => ("└── ", "    "),
                Position::First(_) | Position::Middle(_) => ("├── ", "│   "),
            };
            let (ino, name) = child.into_inner();
            out.push_str(prefix);
            out.push_str(glyph);
            out.push_str(&name.to_string());
            out.push('\n');
            if self.fs.inode(ino)?.typ == InodeType::Dir {
                self.tree_dfs(ino, &format!("{}{}", prefix, indent), out)?;
            }
        }
        Ok(())
    }

    /// Absolute path of the working directory, rebuilt by climbing
    /// `..` links and matching inode indices in each parent.
    pub fn path_string(&self) -> Result<String> {
        let mut parts = Vec::new();
        let mut cur = self.cwd;
        while cur != ROOTINO {
            let parent = self.fs.dirlookup(cur, &FileName::new("..")?)?.0;
            let (_, name) = self
                .fs
                .read_dir(parent)?
                .into_iter()
                .filter(|(_, name)| name.as_bytes() != b"." && name.as_bytes() != b"..")
                .find(|(ino, _)| *ino == cur)
                .ok_or(FsError::NotFound)?;
            parts.push(name.to_string());
            cur = parent;
        }
        let mut path = String::from("/");
        path.push_str(&parts.iter().rev().join("/"));
        Ok(path)
    }
}
