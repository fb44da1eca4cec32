//! Directory primitives used for record containers.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Physical directory operations behind copy, rename and delete of record containers.
///
/// Implementations report plain I/O errors; the storage engine attaches the operation name and
/// key before handing them to callers.
pub trait FolderOps: fmt::Debug + Send + Sync {
    /// Creates `path` and any missing parents.
    ///
    /// # Errors
    /// Fails if a directory cannot be created.
    fn create(&self, path: &Path) -> io::Result<()>;

    /// Recursively copies `src` into `dst`.
    ///
    /// An existing `dst` is merged into: its other entries stay, same-named files are
    /// overwritten.
    ///
    /// # Errors
    /// Fails if any entry cannot be copied.
    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Moves the directory `src` to `dst`, merging into `dst` when it already exists.
    ///
    /// # Errors
    /// Fails if the directory cannot be moved.
    fn move_dir(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Deletes the contents of `path`, and `path` itself when `include_target` is set.
    ///
    /// Returns `false` when there was nothing to delete.
    ///
    /// # Errors
    /// Fails if an entry cannot be removed.
    fn delete(&self, path: &Path, include_target: bool) -> io::Result<bool>;
}

/// [`FolderOps`] on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFolders;

impl FolderOps for LocalFolders {
    fn create(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn copy(&self, src: &Path, dst: &Path) -> io::Result<()> {
        if dst.exists() && !dst.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("copy target is not a directory: {}", dst.display()),
            ));
        }

        for entry in WalkDir::new(src) {
            let entry = entry.map_err(io::Error::from)?;
            let Ok(relative) = entry.path().strip_prefix(src) else { continue };
            let target = dst.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &target)?;
            }
        }

        debug!(src = %src.display(), dst = %dst.display(), "Folder copied");
        Ok(())
    }

    fn move_dir(&self, src: &Path, dst: &Path) -> io::Result<()> {
        if dst.is_dir() {
            self.copy(src, dst)?;
            fs::remove_dir_all(src)?;
            debug!(src = %src.display(), dst = %dst.display(), "Folder merged");
            return Ok(());
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::rename(src, dst) {
            Ok(()) => {},
            Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
                self.copy(src, dst)?;
                fs::remove_dir_all(src)?;
            },
            Err(err) => return Err(err),
        }

        debug!(src = %src.display(), dst = %dst.display(), "Folder moved");
        Ok(())
    }

    fn delete(&self, path: &Path, include_target: bool) -> io::Result<bool> {
        if !path.is_dir() {
            return Ok(false);
        }

        if include_target {
            fs::remove_dir_all(path)?;
        } else {
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    fs::remove_dir_all(entry.path())?;
                } else {
                    fs::remove_file(entry.path())?;
                }
            }
        }

        debug!(path = %path.display(), include_target, "Folder deleted");
        Ok(true)
    }
}
