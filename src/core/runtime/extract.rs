use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::error::{InstallerError, InstallerResult};

use super::platform::PlatformFamily;

#[cfg(unix)]
const S_IFMT: u32 = 0o170000;
#[cfg(unix)]
const S_IFLNK: u32 = 0o120000;

/// One way of unpacking a runtime archive into a directory.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn unpack(&self, archive: &Path, output_dir: &Path) -> InstallerResult<()>;
}

/// In-process zip unpack. Keeps Unix permission bits and symlink entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    fn name(&self) -> &'static str {
        "zip"
    }

    async fn unpack(&self, archive: &Path, output_dir: &Path) -> InstallerResult<()> {
        let archive = archive.to_path_buf();
        let output_dir = output_dir.to_path_buf();
        let task_archive = archive.clone();
        tokio::task::spawn_blocking(move || unpack_zip(&task_archive, &output_dir))
            .await
            .map_err(|e| InstallerError::extraction(archive, format!("task join error: {e}")))?
    }
}

/// Shells out to the system `unzip`. The macOS app bundle relies on symlinks inside
/// its frameworks that must be reproduced exactly.
#[derive(Debug, Clone)]
pub struct NativeUnzipExtractor {
    program: PathBuf,
}

impl Default for NativeUnzipExtractor {
    fn default() -> Self {
        Self {
            program: PathBuf::from("unzip"),
        }
    }
}

impl NativeUnzipExtractor {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ArchiveExtractor for NativeUnzipExtractor {
    fn name(&self) -> &'static str {
        "native-unzip"
    }

    async fn unpack(&self, archive: &Path, output_dir: &Path) -> InstallerResult<()> {
        let output = tokio::process::Command::new(&self.program)
            .arg("-o")
            .arg(archive)
            .arg("-d")
            .arg(output_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                InstallerError::extraction(
                    archive,
                    format!("failed to run {:?}: {e}", self.program),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InstallerError::extraction(
                archive,
                format!("{:?} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }

        Ok(())
    }
}

/// Unpacks with a platform-appropriate strategy and removes the archive afterwards.
pub struct Extractor {
    strategy: Box<dyn ArchiveExtractor>,
}

impl Extractor {
    pub fn new(strategy: Box<dyn ArchiveExtractor>) -> Self {
        Self { strategy }
    }

    pub fn for_family(family: PlatformFamily) -> Self {
        match family {
            PlatformFamily::MacOs => Self::new(Box::new(NativeUnzipExtractor::default())),
            PlatformFamily::Posix | PlatformFamily::Windows => Self::new(Box::new(ZipExtractor)),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// On failure the archive stays in place for inspection.
    pub async fn extract(&self, archive: &Path, output_dir: &Path) -> InstallerResult<()> {
        info!(
            "Extracting {:?} into {:?} ({})",
            archive,
            output_dir,
            self.strategy.name()
        );
        self.strategy.unpack(archive, output_dir).await?;

        if let Err(source) = tokio::fs::remove_file(archive).await {
            warn!("Failed to remove archive {:?}: {}", archive, source);
        }
        Ok(())
    }
}

fn unpack_zip(archive_path: &Path, output_dir: &Path) -> InstallerResult<()> {
    let zip_file =
        fs::File::open(archive_path).map_err(|source| InstallerError::io(archive_path, source))?;
    let mut archive = zip::ZipArchive::new(zip_file)
        .map_err(|e| InstallerError::extraction(archive_path, e))?;

    fs::create_dir_all(output_dir).map_err(|source| InstallerError::io(output_dir, source))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| InstallerError::extraction(archive_path, e))?;

        let relative = entry.enclosed_name().ok_or_else(|| {
            InstallerError::extraction(
                archive_path,
                format!("entry {:?} escapes the output directory", entry.name()),
            )
        })?;
        let out_path = output_dir.join(&relative);

        if let Some(link) = symlinked_ancestor(output_dir, &relative) {
            return Err(InstallerError::extraction(
                archive_path,
                format!("entry {:?} would be written through symlink {:?}", entry.name(), link),
            ));
        }

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|source| InstallerError::io(&out_path, source))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|source| InstallerError::io(parent, source))?;
        }

        // Re-installs overwrite in place; never write through an old symlink.
        if fs::symlink_metadata(&out_path).is_ok_and(|meta| meta.file_type().is_symlink()) {
            fs::remove_file(&out_path).map_err(|source| InstallerError::io(&out_path, source))?;
        }

        #[cfg(unix)]
        {
            if entry.unix_mode().is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
                let mut target = String::new();
                std::io::Read::read_to_string(&mut entry, &mut target)
                    .map_err(|source| InstallerError::io(&out_path, source))?;
                if !link_stays_inside(&relative, &target) {
                    return Err(InstallerError::extraction(
                        archive_path,
                        format!("symlink {:?} points outside the output directory: {}", entry.name(), target),
                    ));
                }
                if out_path.exists() {
                    fs::remove_file(&out_path)
                        .map_err(|source| InstallerError::io(&out_path, source))?;
                }
                std::os::unix::fs::symlink(&target, &out_path)
                    .map_err(|source| InstallerError::io(&out_path, source))?;
                debug!("Linked {:?} -> {}", out_path, target);
                continue;
            }
        }

        {
            let mut out =
                fs::File::create(&out_path).map_err(|source| InstallerError::io(&out_path, source))?;
            std::io::copy(&mut entry, &mut out)
                .map_err(|source| InstallerError::io(&out_path, source))?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777))
                    .map_err(|source| InstallerError::io(&out_path, source))?;
            }
        }
    }

    Ok(())
}

/// First existing symlink among the directories between `output_dir` and the entry.
fn symlinked_ancestor(output_dir: &Path, relative: &Path) -> Option<PathBuf> {
    let mut current = output_dir.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        if fs::symlink_metadata(&current).is_ok_and(|meta| meta.file_type().is_symlink()) {
            return Some(current);
        }
    }
    None
}

/// Whether `target`, read relative to the link's own directory, stays below the root.
#[cfg(unix)]
fn link_stays_inside(link: &Path, target: &str) -> bool {
    use std::path::Component;

    let mut depth = 0_usize;
    for component in link.parent().into_iter().flat_map(Path::components) {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => depth = depth.saturating_sub(1),
            _ => {}
        }
    }

    for component in Path::new(target).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    use super::*;

    fn build_archive(path: &Path) {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        writer
            .start_file("electron", options.unix_permissions(0o755))
            .unwrap();
        writer.write_all(b"#!/bin/sh\nexit 0\n").unwrap();
        writer.add_directory("resources/", options).unwrap();
        writer
            .start_file("resources/default_app.asar", options.unix_permissions(0o644))
            .unwrap();
        writer.write_all(b"asar").unwrap();

        let bytes = writer.finish().unwrap().into_inner();
        std::fs::write(path, bytes).unwrap();
    }

    #[tokio::test]
    async fn zip_strategy_unpacks_and_removes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("runtime.zip");
        build_archive(&archive);

        let extractor = Extractor::new(Box::new(ZipExtractor));
        extractor.extract(&archive, dir.path()).await.unwrap();

        assert!(!archive.exists());
        assert_eq!(
            std::fs::read(dir.path().join("resources/default_app.asar")).unwrap(),
            b"asar"
        );
        assert!(dir.path().join("electron").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zip_strategy_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("runtime.zip");
        build_archive(&archive);

        ZipExtractor.unpack(&archive, dir.path()).await.unwrap();

        let mode = std::fs::metadata(dir.path().join("electron"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zip_strategy_recreates_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("Versions/A/Framework", options).unwrap();
        writer.write_all(b"binary").unwrap();
        writer
            .add_symlink("Framework", "Versions/A/Framework", options)
            .unwrap();
        std::fs::write(&archive, writer.finish().unwrap().into_inner()).unwrap();

        ZipExtractor.unpack(&archive, dir.path()).await.unwrap();

        let link = dir.path().join("Framework");
        assert!(std::fs::symlink_metadata(&link)
            .unwrap()
            .file_type()
            .is_symlink());
        assert_eq!(std::fs::read(&link).unwrap(), b"binary");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_pointing_outside_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let archive = dir.path().join("hostile.zip");

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer
            .add_symlink("link", outside.path().to_str().unwrap(), options)
            .unwrap();
        writer.start_file("link/pwned", options).unwrap();
        writer.write_all(b"owned").unwrap();
        std::fs::write(&archive, writer.finish().unwrap().into_inner()).unwrap();

        let err = ZipExtractor.unpack(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(err, InstallerError::Extraction { .. }));
        assert!(!outside.path().join("pwned").exists());
        assert!(std::fs::symlink_metadata(dir.path().join("link")).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relative_symlink_climbing_out_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let output = root.path().join("bin");
        let archive = root.path().join("hostile.zip");

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer
            .add_symlink("resources/up", "../../escape", options)
            .unwrap();
        std::fs::write(&archive, writer.finish().unwrap().into_inner()).unwrap();

        let err = ZipExtractor.unpack(&archive, &output).await.unwrap_err();

        assert!(matches!(err, InstallerError::Extraction { .. }));
        assert!(std::fs::symlink_metadata(output.join("resources/up")).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn existing_symlinked_directory_is_not_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let archive = dir.path().join("runtime.zip");
        build_archive(&archive);
        std::os::unix::fs::symlink(outside.path(), dir.path().join("resources")).unwrap();

        let err = ZipExtractor.unpack(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(err, InstallerError::Extraction { ref reason, .. } if reason.contains("through symlink")));
        assert!(!outside.path().join("default_app.asar").exists());
    }

    #[cfg(unix)]
    #[test]
    fn link_targets_are_resolved_against_their_directory() {
        assert!(link_stays_inside(Path::new("Framework"), "Versions/A/Framework"));
        assert!(link_stays_inside(Path::new("Versions/Current"), "A"));
        assert!(link_stays_inside(Path::new("a/b/link"), "../../c"));
        assert!(!link_stays_inside(Path::new("a/b/link"), "../../../c"));
        assert!(!link_stays_inside(Path::new("link"), "/etc/passwd"));
        assert!(!link_stays_inside(Path::new("link"), ".."));
    }

    #[tokio::test]
    async fn corrupt_archive_is_extraction_error_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        let err = Extractor::new(Box::new(ZipExtractor))
            .extract(&archive, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, InstallerError::Extraction { .. }));
        assert!(archive.exists());
    }

    #[tokio::test]
    async fn native_strategy_reports_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("runtime.zip");
        build_archive(&archive);

        let extractor = Extractor::new(Box::new(NativeUnzipExtractor::with_program(
            dir.path().join("no-such-unzip"),
        )));
        let err = extractor.extract(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(err, InstallerError::Extraction { .. }));
        assert!(archive.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn native_strategy_treats_non_zero_exit_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("runtime.zip");
        build_archive(&archive);

        let extractor = Extractor::new(Box::new(NativeUnzipExtractor::with_program("false")));
        let err = extractor.extract(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(err, InstallerError::Extraction { ref reason, .. } if reason.contains("exited")));
        assert!(archive.exists());
    }

    #[test]
    fn strategy_follows_platform_family() {
        assert_eq!(
            Extractor::for_family(PlatformFamily::MacOs).strategy_name(),
            "native-unzip"
        );
        assert_eq!(Extractor::for_family(PlatformFamily::Posix).strategy_name(), "zip");
        assert_eq!(Extractor::for_family(PlatformFamily::Windows).strategy_name(), "zip");
    }
}
