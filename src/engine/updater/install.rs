//! Package Installation
//!
//! Two alternative strategies for putting a verified package in place:
//! - [`ArchiveInstaller`] extracts every entry over the install directory
//! - [`ExecutableReplacer`] swaps only the running binary, for platforms
//!   where it cannot be overwritten in place

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::NamedTempFile;

use super::error::{Result, UpdateError};

/// A strategy that installs a staged package
pub trait PackageInstaller: Send + Sync {
    fn name(&self) -> &'static str;

    fn install(&self, package: &Path, destination_root: &Path) -> Result<()>;
}

/// Archive formats the installer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else {
            Self::Zip
        }
    }
}

/// Extracts the whole archive; the archive is the authoritative tree.
///
/// Not transactional: a failure part-way leaves earlier entries replaced.
/// Each individual file is swapped in with a rename, so no file is ever
/// observed half-written.
#[derive(Debug, Default)]
pub struct ArchiveInstaller;

impl PackageInstaller for ArchiveInstaller {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn install(&self, package: &Path, destination_root: &Path) -> Result<()> {
        fs::create_dir_all(destination_root)?;
        match ArchiveFormat::detect(package) {
            ArchiveFormat::Zip => extract_zip(package, destination_root),
            ArchiveFormat::TarGz => extract_tar_gz(package, destination_root),
        }
    }
}

fn extract_zip(package: &Path, root: &Path) -> Result<()> {
    let package_name = package.display().to_string();
    let file = File::open(package).map_err(|e| UpdateError::extraction(&package_name, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| UpdateError::extraction(&package_name, e))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| UpdateError::extraction(format!("#{}", index), e))?;
        let name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| UpdateError::extraction(&name, "path escapes install directory"))?;
        let target = root.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| UpdateError::extraction(&name, e))?;
            continue;
        }

        tracing::debug!(entry = %name, "extracting");
        let mode = entry_mode(entry.unix_mode());
        write_entry(&mut entry, &target, mode).map_err(|e| UpdateError::extraction(&name, e))?;
    }

    Ok(())
}

fn extract_tar_gz(package: &Path, root: &Path) -> Result<()> {
    let package_name = package.display().to_string();
    let file = File::open(package).map_err(|e| UpdateError::extraction(&package_name, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let entries = archive
        .entries()
        .map_err(|e| UpdateError::extraction(&package_name, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| UpdateError::extraction(&package_name, e))?;
        let relative = entry
            .path()
            .map_err(|e| UpdateError::extraction(&package_name, e))?
            .into_owned();
        let name = relative.display().to_string();
        if !is_enclosed(&relative) {
            return Err(UpdateError::extraction(&name, "path escapes install directory"));
        }
        let target = root.join(&relative);
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| UpdateError::extraction(&name, e))?;
        } else if entry_type.is_file() {
            tracing::debug!(entry = %name, "extracting");
            let mode = entry.header().mode().ok();
            write_entry(&mut entry, &target, entry_mode(mode))
                .map_err(|e| UpdateError::extraction(&name, e))?;
        } else {
            tracing::debug!(entry = %name, ?entry_type, "skipping non-regular entry");
        }
    }

    Ok(())
}

fn is_enclosed(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn entry_mode(mode: Option<u32>) -> Option<u32> {
    mode.map(|m| m & 0o7777).filter(|m| *m != 0)
}

/// Write an entry beside its target, then rename it into place
fn write_entry(reader: &mut impl io::Read, target: &Path, mode: Option<u32>) -> io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no parent"))?;
    fs::create_dir_all(parent)?;

    let mut staged = NamedTempFile::new_in(parent)?;
    io::copy(reader, staged.as_file_mut())?;
    set_mode(staged.path(), mode)?;
    staged.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// Replaces only the running executable with its platform build from the package.
///
/// The package must contain an entry named `<exe>_<os>_<arch>`.
#[derive(Debug, Clone)]
pub struct ExecutableReplacer {
    executable: PathBuf,
    entry_name: String,
}

impl ExecutableReplacer {
    pub fn new(executable: PathBuf) -> Self {
        let exe_name = executable
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let entry_name = format!(
            "{}_{}_{}",
            exe_name,
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        Self {
            executable,
            entry_name,
        }
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    /// Copy the platform entry next to the executable, mark it executable
    fn stage(&self, package: &Path) -> Result<NamedTempFile> {
        let package_name = package.display().to_string();
        let file = File::open(package).map_err(|e| UpdateError::extraction(&package_name, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| UpdateError::extraction(&package_name, e))?;
        let mut entry = archive.by_name(&self.entry_name).map_err(|_| {
            UpdateError::Replacement(format!(
                "no update file for this platform ({}) in package",
                self.entry_name
            ))
        })?;

        let dir = self
            .executable
            .parent()
            .ok_or_else(|| UpdateError::Replacement("executable has no parent directory".into()))?;
        let mut staged = tempfile::Builder::new()
            .prefix(".exec_")
            .tempfile_in(dir)
            .map_err(|e| UpdateError::Replacement(e.to_string()))?;
        io::copy(&mut entry, staged.as_file_mut())
            .map_err(|e| UpdateError::extraction(&self.entry_name, e))?;
        set_mode(staged.path(), Some(0o755)).map_err(|e| UpdateError::Replacement(e.to_string()))?;
        Ok(staged)
    }

    /// POSIX: rename over the running binary
    #[cfg(not(windows))]
    fn swap(&self, staged: NamedTempFile) -> Result<()> {
        staged
            .persist(&self.executable)
            .map_err(|e| UpdateError::Replacement(e.error.to_string()))?;
        tracing::info!(path = %self.executable.display(), "executable replaced");
        Ok(())
    }

    /// Windows locks running executables: hand the move to a detached shell
    /// that runs after this process exits.
    #[cfg(windows)]
    fn swap(&self, staged: NamedTempFile) -> Result<()> {
        use std::os::windows::process::CommandExt;
        use std::process::{Command, Stdio};
        const DETACHED_PROCESS: u32 = 0x0000_0008;

        let (_, staged_path) = staged
            .keep()
            .map_err(|e| UpdateError::Replacement(e.error.to_string()))?;
        let script = format!(
            "ping 127.0.0.1 -n 3 >nul & move /Y \"{}\" \"{}\"",
            staged_path.display(),
            self.executable.display()
        );
        Command::new("cmd")
            .args(["/C", &script])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .creation_flags(DETACHED_PROCESS)
            .spawn()
            .map_err(|e| UpdateError::Replacement(e.to_string()))?;
        tracing::info!(path = %self.executable.display(), "executable swap scheduled after exit");
        Ok(())
    }
}

impl PackageInstaller for ExecutableReplacer {
    fn name(&self) -> &'static str {
        "executable"
    }

    fn install(&self, package: &Path, _destination_root: &Path) -> Result<()> {
        let staged = self.stage(package)?;
        self.swap(staged)
    }
}
