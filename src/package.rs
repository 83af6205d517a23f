//! Update package staging
//!
//! A package is either a directory laid out as an update package, or a zip
//! archive of one. Archives are extracted into a fresh staging directory.

use anyhow::{Context, Result, bail};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A package ready for the engine
#[derive(Debug, Clone)]
pub struct StagedPackage {
    /// Directory to hand to `update_files`
    pub root: PathBuf,
    /// What the user pointed at
    pub origin: PathBuf,
    /// `root` is a staging directory created from an archive
    pub extracted: bool,
}

impl StagedPackage {
    /// Directories and files to remove once the package is consumed
    pub fn removable_paths(&self) -> Vec<&Path> {
        if self.extracted {
            vec![self.root.as_path(), self.origin.as_path()]
        } else {
            vec![self.root.as_path()]
        }
    }
}

/// Check if `path` looks like a zip archive
pub fn is_zip(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Resolve `package` into a directory
///
/// Directories are used in place. Zip archives are extracted to
/// `<staging_root>/<archive stem>-<pid>`.
pub fn stage(package: &Path, staging_root: &Path) -> Result<StagedPackage> {
    if package.is_dir() {
        return Ok(StagedPackage {
            root: package.to_path_buf(),
            origin: package.to_path_buf(),
            extracted: false,
        });
    }
    if !package.exists() {
        bail!("Package not found: {}", package.display());
    }
    if !is_zip(package) {
        bail!(
            "Package must be a directory or a .zip archive: {}",
            package.display()
        );
    }

    let stem = package
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package".to_string());
    let dest = staging_root.join(format!("{stem}-{}", std::process::id()));
    if dest.exists() {
        fs::remove_dir_all(&dest)
            .with_context(|| format!("Failed to clear staging dir: {}", dest.display()))?;
    }
    fs::create_dir_all(&dest)
        .with_context(|| format!("Failed to create staging dir: {}", dest.display()))?;

    let count = extract_zip(package, &dest)?;
    log::info!(
        "Extracted {count} file(s) from {} to {}",
        package.display(),
        dest.display()
    );

    Ok(StagedPackage {
        root: dest,
        origin: package.to_path_buf(),
        extracted: true,
    })
}

/// Extract every file of `archive` below `dest`, returning the file count
///
/// Entries whose names would escape `dest` are skipped.
fn extract_zip(archive: &Path, dest: &Path) -> Result<usize> {
    let file = fs::File::open(archive)
        .with_context(|| format!("Failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("Not a valid zip archive: {}", archive.display()))?;

    let mut count = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            log::warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", out_path.display()))?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_directory_used_in_place() {
        let tmp = TempDir::new().unwrap();
        let staged = stage(tmp.path(), &tmp.path().join("staging")).unwrap();

        assert_eq!(staged.root, tmp.path());
        assert!(!staged.extracted);
        assert_eq!(staged.removable_paths().len(), 1);
        assert!(!tmp.path().join("staging").exists());
    }

    #[test]
    fn test_zip_is_extracted() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("release-1.2.zip");
        write_zip(
            &archive,
            &[("app.dll.upd", "v2"), ("conf/settings.xml.xmrg", "<t/>")],
        );

        let staged = stage(&archive, &tmp.path().join("staging")).unwrap();

        assert!(staged.extracted);
        assert!(staged.root.starts_with(tmp.path().join("staging")));
        assert_eq!(
            fs::read_to_string(staged.root.join("app.dll.upd")).unwrap(),
            "v2"
        );
        assert!(staged.root.join("conf/settings.xml.xmrg").exists());
        assert_eq!(staged.removable_paths(), vec![staged.root.as_path(), archive.as_path()]);
    }

    #[test]
    fn test_unsafe_entries_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("evil.zip");
        write_zip(&archive, &[("../escape.add", "x"), ("ok.add", "y")]);

        let staged = stage(&archive, &tmp.path().join("staging")).unwrap();

        assert!(staged.root.join("ok.add").exists());
        assert!(!tmp.path().join("staging/escape.add").exists());
    }

    #[test]
    fn test_missing_package_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = stage(&tmp.path().join("nope.zip"), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Package not found"));
    }

    #[test]
    fn test_plain_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("package.tar");
        fs::write(&file, "x").unwrap();

        let err = stage(&file, tmp.path()).unwrap_err();
        assert!(err.to_string().contains(".zip"));
    }

    #[test]
    fn test_corrupt_zip_is_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("broken.zip");
        fs::write(&file, "not a zip").unwrap();

        let err = stage(&file, &tmp.path().join("staging")).unwrap_err();
        assert!(err.to_string().contains("Not a valid zip"));
    }
}
