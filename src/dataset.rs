//! Dataset tree discovery and output path mapping

use crate::error::{DatasetError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find every file under `root` whose name matches `pattern`, sorted by path
///
/// # Errors
/// - `pattern` is not a valid glob
/// - `root` is missing or cannot be walked
pub fn discover_images(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = glob::Pattern::new(pattern).map_err(|e| {
        DatasetError::invalid_config(format!("Invalid pattern '{}': {}", pattern, e))
    })?;

    if !root.is_dir() {
        return Err(DatasetError::invalid_config(format!(
            "Input directory {} does not exist",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            DatasetError::processing(format!("Failed to walk {}: {}", root.display(), e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|name| matcher.matches(name));
        if matches {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Name recorded in the processed-image log
///
/// # Errors
/// - The path has no UTF-8 file name
pub fn log_key(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            DatasetError::processing(format!("{} has no UTF-8 file name", path.display()))
        })
}

/// Where a source image lands in the output tree
///
/// Flat layout uses only the immediate parent directory name; with
/// `preserve_hierarchy` the full path relative to `input_root` is kept.
///
/// # Errors
/// - `source` is not under `input_root` or has no file name
pub fn output_path(
    source: &Path,
    input_root: &Path,
    output_root: &Path,
    preserve_hierarchy: bool,
) -> Result<PathBuf> {
    let relative = source.strip_prefix(input_root).map_err(|_| {
        DatasetError::processing(format!(
            "{} is not inside {}",
            source.display(),
            input_root.display()
        ))
    })?;
    let file_name = relative.file_name().ok_or_else(|| {
        DatasetError::processing(format!("{} has no file name", source.display()))
    })?;

    if preserve_hierarchy {
        return Ok(output_root.join(relative));
    }

    let category = relative
        .parent()
        .and_then(Path::file_name);
    Ok(match category {
        Some(category) => output_root.join(category).join(file_name),
        None => output_root.join(file_name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_discover_matches_pattern_recursively_in_sorted_order() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "Tesla Model S/img_2.jpg");
        touch(temp.path(), "BMW i8/img_1.jpg");
        touch(temp.path(), "BMW i8/img_3.png");
        touch(temp.path(), "BMW i8/nested/img_4.jpg");

        let found = discover_images(temp.path(), "*.jpg").unwrap();
        let relative: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(temp.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("BMW i8/img_1.jpg"),
                PathBuf::from("BMW i8/nested/img_4.jpg"),
                PathBuf::from("Tesla Model S/img_2.jpg"),
            ]
        );
    }

    #[test]
    fn test_discover_errors() {
        let temp = TempDir::new().unwrap();
        assert!(discover_images(&temp.path().join("missing"), "*.jpg").is_err());
        assert!(discover_images(temp.path(), "[").is_err());
    }

    #[test]
    fn test_output_path_flat_uses_parent_name() {
        let input = Path::new("data");
        let output = Path::new("preprocessed data");

        assert_eq!(
            output_path(Path::new("data/BMW i8/img_1.jpg"), input, output, false).unwrap(),
            PathBuf::from("preprocessed data/BMW i8/img_1.jpg")
        );
        assert_eq!(
            output_path(Path::new("data/a/BMW i8/img_1.jpg"), input, output, false).unwrap(),
            PathBuf::from("preprocessed data/BMW i8/img_1.jpg")
        );
        assert_eq!(
            output_path(Path::new("data/img_1.jpg"), input, output, false).unwrap(),
            PathBuf::from("preprocessed data/img_1.jpg")
        );
    }

    #[test]
    fn test_output_path_preserving_hierarchy() {
        assert_eq!(
            output_path(
                Path::new("data/a/BMW i8/img_1.jpg"),
                Path::new("data"),
                Path::new("out"),
                true
            )
            .unwrap(),
            PathBuf::from("out/a/BMW i8/img_1.jpg")
        );
    }

    #[test]
    fn test_output_path_outside_root_fails() {
        assert!(output_path(
            Path::new("elsewhere/img_1.jpg"),
            Path::new("data"),
            Path::new("out"),
            false
        )
        .is_err());
    }

    #[test]
    fn test_log_key_is_base_name() {
        assert_eq!(log_key(Path::new("data/BMW i8/img_1.jpg")).unwrap(), "img_1.jpg");
    }
}
