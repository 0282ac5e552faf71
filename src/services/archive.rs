use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::{Component, Path, PathBuf},
};

use zip::ZipArchive;

use crate::models::errors::AppError;

const SYMLINK_MODE: u32 = 0o120000;
const FILE_TYPE_MASK: u32 = 0o170000;

/// Validates untrusted ZIP archives and unpacks them into a workspace.
///
/// Extraction is all-or-nothing with respect to path safety: every entry is
/// resolved against the canonical target directory before anything is
/// written, and a single escaping entry rejects the whole archive.
#[derive(Debug, Clone)]
pub struct ArchiveSanitizer {
    max_extracted_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub bytes: u64,
}

#[derive(Debug)]
enum PlannedEntry {
    Directory(PathBuf),
    File { index: usize, dest: PathBuf },
    Symlink { dest: PathBuf, target: PathBuf },
}

impl ArchiveSanitizer {
    pub fn new(max_extracted_size: u64) -> Self {
        Self { max_extracted_size }
    }

    /// Whether `path` is a readable ZIP container
    pub fn is_valid_archive(path: &Path) -> bool {
        match File::open(path) {
            Ok(file) => ZipArchive::new(BufReader::new(file)).is_ok(),
            Err(_) => false,
        }
    }

    /// Unpack `archive_path` into `target_dir`, then remove the archive.
    pub fn extract_safely(
        &self,
        archive_path: &Path,
        target_dir: &Path,
    ) -> Result<ExtractionSummary, AppError> {
        let root = target_dir.canonicalize().map_err(|e| {
            AppError::internal_error(format!("Failed to resolve extraction target: {}", e))
        })?;

        let file = File::open(archive_path)
            .map_err(|e| AppError::internal_error(format!("Failed to open archive: {}", e)))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| AppError::invalid_archive(e.to_string()))?;

        let plan = self.plan(&mut archive, &root)?;
        let summary = self.apply(&mut archive, &root, &plan)?;
        drop(archive);

        fs::remove_file(archive_path)
            .map_err(|e| AppError::internal_error(format!("Failed to remove archive: {}", e)))?;

        tracing::debug!(
            "Extracted {} files, {} directories, {} symlinks ({} bytes) into {}",
            summary.files,
            summary.directories,
            summary.symlinks,
            summary.bytes,
            root.display()
        );
        Ok(summary)
    }

    /// Resolve and check every entry without touching the filesystem.
    fn plan<R: Read + io::Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        root: &Path,
    ) -> Result<Vec<PlannedEntry>, AppError> {
        let mut plan = Vec::with_capacity(archive.len());
        let mut declared_size: u64 = 0;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| AppError::invalid_archive(e.to_string()))?;
            let name = entry.name().to_string();

            let dest = normalize_under(root, Path::new(&name))
                .filter(|dest| dest.starts_with(root))
                .ok_or_else(|| AppError::unsafe_archive(&name))?;

            if is_symlink(entry.unix_mode()) {
                let mut target = String::new();
                entry
                    .read_to_string(&mut target)
                    .map_err(|e| AppError::invalid_archive(e.to_string()))?;

                let parent = dest.parent().unwrap_or(root);
                let resolved = normalize_under(parent, Path::new(&target))
                    .filter(|resolved| resolved.starts_with(root));
                if dest == root || resolved.is_none() {
                    return Err(AppError::unsafe_archive(format!("{} -> {}", name, target)));
                }

                plan.push(PlannedEntry::Symlink {
                    dest,
                    target: PathBuf::from(target),
                });
            } else if entry.is_dir() {
                plan.push(PlannedEntry::Directory(dest));
            } else {
                if dest == root {
                    return Err(AppError::unsafe_archive(&name));
                }
                declared_size = declared_size.saturating_add(entry.size());
                plan.push(PlannedEntry::File { index, dest });
            }
        }

        if declared_size > self.max_extracted_size {
            return Err(AppError::ArchiveTooLarge {
                size: declared_size,
                limit: self.max_extracted_size,
            });
        }

        check_link_layout(root, &plan)?;
        Ok(plan)
    }

    fn apply<R: Read + io::Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        root: &Path,
        plan: &[PlannedEntry],
    ) -> Result<ExtractionSummary, AppError> {
        let mut summary = ExtractionSummary::default();

        for planned in plan {
            match planned {
                PlannedEntry::Directory(dest) => {
                    create_dir_within(root, dest)?;
                    summary.directories += 1;
                }
                PlannedEntry::File { index, dest } => {
                    if let Some(parent) = dest.parent() {
                        create_dir_within(root, parent)?;
                    }

                    let mut entry = archive
                        .by_index(*index)
                        .map_err(|e| AppError::invalid_archive(e.to_string()))?;
                    let budget = self.max_extracted_size - summary.bytes;
                    let written = write_entry(&mut entry, dest, budget)?;
                    if written > budget {
                        return Err(AppError::ArchiveTooLarge {
                            size: summary.bytes + written,
                            limit: self.max_extracted_size,
                        });
                    }

                    summary.bytes += written;
                    summary.files += 1;
                }
                PlannedEntry::Symlink { .. } => {}
            }
        }

        // Links go last so no extracted file is ever written through one.
        for planned in plan {
            if let PlannedEntry::Symlink { dest, target } = planned {
                if let Some(parent) = dest.parent() {
                    create_dir_within(root, parent)?;
                }
                if fs::symlink_metadata(dest).is_ok() {
                    return Err(AppError::unsafe_archive(dest.display().to_string()));
                }
                create_symlink(target, dest)?;
                summary.symlinks += 1;
            }
        }

        for planned in plan {
            if let PlannedEntry::Symlink { dest, .. } = planned {
                ensure_link_within(root, dest)?;
            }
        }

        Ok(summary)
    }
}

/// Join `candidate` onto `base`, resolving `.` and `..` lexically.
///
/// Returns `None` for absolute paths, drive prefixes, or `..` climbing above
/// the filesystem root.
fn normalize_under(base: &Path, candidate: &Path) -> Option<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// Reject layouts where a link would be traversed or clobbered.
///
/// Nothing may be extracted at or below a link, and a link target may only
/// name another link as its final component. Together these keep the lexical
/// containment checks in `plan` equal to what the filesystem resolves.
fn check_link_layout(root: &Path, plan: &[PlannedEntry]) -> Result<(), AppError> {
    let links: Vec<&Path> = plan
        .iter()
        .filter_map(|planned| match planned {
            PlannedEntry::Symlink { dest, .. } => Some(dest.as_path()),
            _ => None,
        })
        .collect();
    if links.is_empty() {
        return Ok(());
    }

    for (position, planned) in plan.iter().enumerate() {
        let dest = match planned {
            PlannedEntry::Directory(dest) | PlannedEntry::File { dest, .. } => dest,
            PlannedEntry::Symlink { dest, target } => {
                let parent = dest.parent().unwrap_or(root);
                if traverses_link(parent, target, &links) {
                    return Err(AppError::unsafe_archive(format!(
                        "{} -> {}",
                        display_relative(root, dest),
                        target.display()
                    )));
                }
                dest
            }
        };

        let collides = plan.iter().enumerate().any(|(other, planned)| match planned {
            PlannedEntry::Symlink { dest: link, .. } => other != position && dest.starts_with(link),
            _ => false,
        });
        if collides {
            return Err(AppError::unsafe_archive(display_relative(root, dest)));
        }
    }

    Ok(())
}

/// Whether resolving `target` from `base` steps through one of `links`
/// before its last component.
fn traverses_link(base: &Path, target: &Path, links: &[&Path]) -> bool {
    let mut resolved = base.to_path_buf();
    let mut components = target.components().peekable();
    while let Some(component) = components.next() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::ParentDir => {
                resolved.pop();
            }
            _ => {}
        }
        if components.peek().is_some() && links.iter().any(|link| resolved.as_path() == *link) {
            return true;
        }
    }
    false
}

/// Confirm a created link resolves inside `root`, removing it otherwise.
///
/// A dangling link is accepted; its target was already checked lexically.
fn ensure_link_within(root: &Path, dest: &Path) -> Result<(), AppError> {
    match dest.canonicalize() {
        Ok(real) if real.starts_with(root) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Ok(_) | Err(_) => {}
    }

    if let Err(e) = fs::remove_file(dest) {
        tracing::warn!("Failed to remove escaping link {}: {}", dest.display(), e);
    }
    Err(AppError::unsafe_archive(display_relative(root, dest)))
}

fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn is_symlink(unix_mode: Option<u32>) -> bool {
    unix_mode.map_or(false, |mode| mode & FILE_TYPE_MASK == SYMLINK_MODE)
}

/// Create `dir` and confirm its real location is still under `root`.
fn create_dir_within(root: &Path, dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::internal_error(format!("Failed to create {}: {}", dir.display(), e)))?;

    let real = dir
        .canonicalize()
        .map_err(|e| AppError::internal_error(format!("Failed to resolve {}: {}", dir.display(), e)))?;
    if !real.starts_with(root) {
        return Err(AppError::unsafe_archive(dir.display().to_string()));
    }
    Ok(())
}

fn write_entry(entry: &mut impl Read, dest: &Path, budget: u64) -> Result<u64, AppError> {
    let mut out = File::create(dest)
        .map_err(|e| AppError::internal_error(format!("Failed to create {}: {}", dest.display(), e)))?;

    io::copy(&mut entry.take(budget.saturating_add(1)), &mut out).map_err(|e| {
        if e.kind() == io::ErrorKind::InvalidData {
            AppError::invalid_archive(e.to_string())
        } else {
            AppError::internal_error(format!("Failed to extract {}: {}", dest.display(), e))
        }
    })
}

#[cfg(unix)]
fn create_symlink(target: &Path, dest: &Path) -> Result<(), AppError> {
    std::os::unix::fs::symlink(target, dest).map_err(|e| {
        AppError::internal_error(format!("Failed to create link {}: {}", dest.display(), e))
    })
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, dest: &Path) -> Result<(), AppError> {
    tracing::warn!(
        "Skipping archive symlink {} -> {}: unsupported on this platform",
        dest.display(),
        target.display()
    );
    Ok(())
}
