//! Unpacking one layer archive on top of the layers below it

use crate::errors::PullError;
use std::{
    collections::HashSet,
    fs, io,
    io::Read,
    path::{Component, Path, PathBuf},
};
use tar::{Archive, EntryType};

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Extract a tar stream into `root`, returning the number of entries written
///
/// `root` must already be canonical. Files replace whatever an earlier layer
/// left at the same path, and whiteout markers delete from earlier layers
/// instead of being written out.
pub fn extract<R: Read>(root: &Path, reader: R) -> Result<usize, PullError> {
    let mut archive = Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_unpack_xattrs(false);

    let mut written = HashSet::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.into_owned();
        let path = relative_entry_path(&raw_path)?;
        let file_name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name.to_owned(),
            None => continue,
        };
        let parent = path.parent().unwrap_or_else(|| Path::new(""));

        if file_name == OPAQUE_WHITEOUT {
            log::debug!("opaque whiteout in {:?}", parent);
            clear_lower_entries(root, parent, &written)?;
            continue;
        }
        if let Some(hidden) = file_name.strip_prefix(WHITEOUT_PREFIX) {
            log::debug!("whiteout {:?}", parent.join(hidden));
            remove_in_root(root, &parent.join(hidden))?;
            continue;
        }

        let kind = entry.header().entry_type();
        let is_dir = kind == EntryType::Directory;
        let is_link = kind == EntryType::Link || kind == EntryType::Symlink;
        if let Ok(existing) = fs::symlink_metadata(root.join(&path)) {
            // links are created, never written through, so the old entry goes
            if existing.is_dir() != is_dir || (is_link && !existing.is_dir()) {
                remove_in_root(root, &path)?;
            }
        }

        if entry.unpack_in(root)? {
            written.insert(path);
        } else {
            log::warn!("skipped archive entry {:?}", raw_path);
        }
    }
    Ok(written.len())
}

/// Archive path relative to the root, refusing anything that could escape it
fn relative_entry_path(raw: &Path) -> Result<PathBuf, PullError> {
    let mut path = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PullError::PathTraversal(raw.to_owned()))
            }
        }
    }
    Ok(path)
}

/// Resolve the directory holding `relative` without following its last
/// component, making sure it is still inside `root`
fn parent_in_root(root: &Path, relative: &Path) -> Result<Option<PathBuf>, PullError> {
    let parent = match root.join(relative).parent() {
        Some(parent) => parent.to_owned(),
        None => return Ok(None),
    };
    match fs::canonicalize(&parent) {
        Ok(parent) if parent.starts_with(root) => Ok(Some(parent)),
        Ok(_) => Err(PullError::PathTraversal(relative.to_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn remove_in_root(root: &Path, relative: &Path) -> Result<(), PullError> {
    let name = match relative.file_name() {
        Some(name) => name,
        None => return Ok(()),
    };
    let target = match parent_in_root(root, relative)? {
        Some(parent) => parent.join(name),
        None => return Ok(()),
    };
    let result = match fs::symlink_metadata(&target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(&target),
        Ok(_) => fs::remove_file(&target),
        Err(err) => Err(err),
    };
    match result {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

/// Empty a directory of everything not written by the current layer
fn clear_lower_entries(
    root: &Path,
    dir: &Path,
    written: &HashSet<PathBuf>,
) -> Result<(), PullError> {
    let full = match fs::canonicalize(root.join(dir)) {
        Ok(full) if full.starts_with(root) => full,
        Ok(_) => return Err(PullError::PathTraversal(dir.to_owned())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    for child in fs::read_dir(full)? {
        let child = dir.join(child?.file_name());
        if !written.iter().any(|path| path.starts_with(&child)) {
            remove_in_root(root, &child)?;
        }
    }
    Ok(())
}
