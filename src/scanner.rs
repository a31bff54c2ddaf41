//! Expansion of input paths into concrete image files.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions eligible for encoding (matched case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Expand a single input path into image file paths.
///
/// A directory contributes its immediate image entries (non-recursive);
/// a regular file contributes itself if its extension matches. A path that
/// does not exist, does not match, or is neither a file nor a directory
/// contributes nothing.
pub fn expand_path(path: &Path) -> Vec<PathBuf> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "cannot stat input path");
            return Vec::new();
        }
    };

    if metadata.is_dir() {
        list_image_files(path)
    } else if metadata.is_file() {
        if has_image_extension(path) {
            vec![path.to_path_buf()]
        } else {
            tracing::warn!(path = %path.display(), "not a supported image file, skipping");
            Vec::new()
        }
    } else {
        // Sockets, fifos and the like are never images.
        Vec::new()
    }
}

/// List image files directly inside a directory, sorted by path.
fn list_image_files(directory: &Path) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %directory.display(), error = %e, "unreadable directory entry");
                continue;
            }
        };

        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            images.push(entry.path().to_path_buf());
        }
    }

    // Sort by path for consistent ordering
    images.sort();

    images
}

fn has_image_extension(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|e| *e == ext_lower)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn test_expand_directory_filters_extensions() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("a.jpg")).unwrap();
        File::create(dir.path().join("b.JPG")).unwrap();
        File::create(dir.path().join("b.txt")).unwrap();
        File::create(dir.path().join("c")).unwrap();
        fs::create_dir(dir.path().join("d")).unwrap();

        let files = expand_path(dir.path());

        assert_eq!(files.len(), 2);
        assert!(files.contains(&dir.path().join("a.jpg")));
        assert!(files.contains(&dir.path().join("b.JPG")));
    }

    #[test]
    fn test_expand_is_not_recursive() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("top.png")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested/inner.png")).unwrap();

        let files = expand_path(dir.path());

        assert_eq!(files, vec![dir.path().join("top.png")]);
    }

    #[test]
    fn test_expand_single_matching_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("photo.png");
        File::create(&file).unwrap();

        assert_eq!(expand_path(&file), vec![file]);
    }

    #[test]
    fn test_expand_single_non_image_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        File::create(&file).unwrap();

        assert!(expand_path(&file).is_empty());
    }

    #[test]
    fn test_expand_missing_path() {
        let dir = tempdir().unwrap();

        assert!(expand_path(&dir.path().join("does-not-exist")).is_empty());
    }

    #[test]
    fn test_directory_listing_is_sorted() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("z.webp")).unwrap();
        File::create(dir.path().join("a.bmp")).unwrap();
        File::create(dir.path().join("m.jpeg")).unwrap();

        let files = expand_path(dir.path());

        assert_eq!(
            files,
            vec![
                dir.path().join("a.bmp"),
                dir.path().join("m.jpeg"),
                dir.path().join("z.webp"),
            ]
        );
    }
}
