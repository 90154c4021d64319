//! Copy and delete helpers shared by backup, restore, and removal.
//!
//! Symbolic links are copied and deleted as links; their targets are never
//! followed.

use std::fs;
use std::io;
use std::path::Path;

/// Recursively copies `source` to `dest`.
///
/// `on_overwrite` is called for every destination file that already existed
/// before it was replaced.
pub fn copy_tree(source: &Path, dest: &Path, on_overwrite: &mut dyn FnMut(&Path)) -> io::Result<()> {
    let meta = fs::symlink_metadata(source)?;

    if meta.file_type().is_symlink() {
        return copy_link(source, dest, on_overwrite);
    }

    if meta.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_tree(&entry.path(), &dest.join(entry.file_name()), on_overwrite)?;
        }
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(dest).is_ok() {
        on_overwrite(dest);
    }
    fs::copy(source, dest)?;
    Ok(())
}

#[cfg(unix)]
fn copy_link(source: &Path, dest: &Path, on_overwrite: &mut dyn FnMut(&Path)) -> io::Result<()> {
    let target = fs::read_link(source)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(dest).is_ok() {
        on_overwrite(dest);
        delete_path(dest)?;
    }
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn copy_link(source: &Path, dest: &Path, on_overwrite: &mut dyn FnMut(&Path)) -> io::Result<()> {
    if fs::symlink_metadata(dest).is_ok() {
        on_overwrite(dest);
    }
    fs::copy(source, dest).map(|_| ())
}

/// Deletes a file, link, or directory tree. A missing path is not an error.
pub fn delete_path(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Whether the path exists, without following a final symlink.
pub fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
