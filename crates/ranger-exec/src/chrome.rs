//! Chrome-for-Testing binaries in a local cache directory.
//!
//! Layout: `<cache>/chrome/<platform>-<version>/chrome-<platform>/<executable>`.
//! A version missing from the cache is downloaded and unpacked in place
//! unless the provisioner is offline.
use std::{
    io::Read,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use ranger_core::collab::{BinaryProvisioner, ProvisionError};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};

use crate::error::{ExecError, ExecResult};

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "macos", target_arch = "aarch64"))] {
        const PLATFORM: &str = "mac-arm64";
        const EXECUTABLE: &str = "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing";
    } else if #[cfg(target_os = "macos")] {
        const PLATFORM: &str = "mac-x64";
        const EXECUTABLE: &str = "Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing";
    } else if #[cfg(all(target_os = "windows", target_pointer_width = "32"))] {
        const PLATFORM: &str = "win32";
        const EXECUTABLE: &str = "chrome.exe";
    } else if #[cfg(target_os = "windows")] {
        const PLATFORM: &str = "win64";
        const EXECUTABLE: &str = "chrome.exe";
    } else {
        const PLATFORM: &str = "linux64";
        const EXECUTABLE: &str = "chrome";
    }
}

pub const DOWNLOAD_BASE_URL: &str = "https://storage.googleapis.com/chrome-for-testing-public";
pub const KNOWN_GOOD_VERSIONS_URL: &str =
    "https://googlechromelabs.github.io/chrome-for-testing/known-good-versions-with-downloads.json";

/// One entry of the Chrome-for-Testing version index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KnownVersion {
    pub version: String,
    pub revision: String,
}

#[derive(Debug, Deserialize)]
struct KnownGoodVersions {
    versions: Vec<KnownVersion>,
}

#[derive(Debug, Clone)]
pub struct CacheProvisioner {
    cache_dir: PathBuf,
    platform: &'static str,
    executable: &'static str,
    /// `None` disables downloads.
    download_base: Option<String>,
    versions_url: String,
    client: reqwest::Client,
}

impl CacheProvisioner {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            platform: PLATFORM,
            executable: EXECUTABLE,
            download_base: Some(DOWNLOAD_BASE_URL.to_string()),
            versions_url: KNOWN_GOOD_VERSIONS_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Only use binaries already in the cache.
    pub fn offline(mut self) -> Self {
        self.download_base = None;
        self
    }

    pub fn with_download_base(mut self, url: impl Into<String>) -> Self {
        self.download_base = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_versions_url(mut self, url: impl Into<String>) -> Self {
        self.versions_url = url.into();
        self
    }

    #[inline]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Install directory of `version`.
    pub fn install_dir(&self, version: &str) -> PathBuf {
        self.cache_dir
            .join("chrome")
            .join(format!("{}-{version}", self.platform))
    }

    pub fn executable_path(&self, version: &str) -> PathBuf {
        self.install_dir(version)
            .join(format!("chrome-{}", self.platform))
            .join(self.executable)
    }

    /// Archive URL of `version`, if downloads are enabled.
    pub fn download_url(&self, version: &str) -> Option<String> {
        let platform = self.platform;
        self.download_base
            .as_ref()
            .map(|base| format!("{base}/{version}/{platform}/chrome-{platform}.zip"))
    }

    /// Every published version, newest first.
    pub async fn known_versions(&self) -> ExecResult<Vec<KnownVersion>> {
        let index: KnownGoodVersions = self
            .client
            .get(&self.versions_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let mut versions = index.versions;
        versions.reverse();
        Ok(versions)
    }

    /// Remove the whole cache directory. Returns `false` if it did not exist.
    pub async fn clean(&self) -> ExecResult<bool> {
        match tokio::fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => {
                info!(target: "ranger.exec.chrome", dir = %self.cache_dir.display(), "cache removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn install(&self, version: &str, url: &str) -> ExecResult<PathBuf> {
        let install_dir = self.install_dir(version);
        let parent = self.cache_dir.join("chrome");
        tokio::fs::create_dir_all(&parent).await?;

        let stem = format!(".{}-{version}.{}", self.platform, std::process::id());
        let archive = parent.join(format!("{stem}.zip"));
        let staging = parent.join(format!("{stem}.partial"));

        let result = self.unpack(url, &archive, &staging, &install_dir).await;
        let _ = tokio::fs::remove_file(&archive).await;
        if result.is_err() {
            let _ = tokio::fs::remove_dir_all(&staging).await;
        }
        result?;

        let exe = self.executable_path(version);
        if !tokio::fs::try_exists(&exe).await.unwrap_or(false) {
            return Err(ExecError::Download(format!(
                "archive for {version} has no {}",
                self.executable
            )));
        }
        Ok(exe)
    }

    async fn unpack(&self, url: &str, archive: &Path, staging: &Path, install_dir: &Path) -> ExecResult<()> {
        info!(target: "ranger.exec.chrome", %url, "downloading chrome");
        download(&self.client, url, archive).await?;

        let (src, dst) = (archive.to_path_buf(), staging.to_path_buf());
        tokio::task::spawn_blocking(move || extract(&src, &dst))
            .await
            .map_err(|e| ExecError::Download(format!("extract task failed: {e}")))??;

        // A directory without the executable is a broken earlier install.
        if tokio::fs::try_exists(install_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(install_dir).await?;
        }
        tokio::fs::rename(staging, install_dir).await?;
        debug!(target: "ranger.exec.chrome", dir = %install_dir.display(), "chrome unpacked");
        Ok(())
    }
}

async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> ExecResult<()> {
    let mut response = client.get(url).send().await?.error_for_status()?;
    let mut file = tokio::fs::File::create(dest).await?;
    let mut written = 0usize;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.sync_all().await?;
    trace!(target: "ranger.exec.chrome", bytes = written, "archive downloaded");
    Ok(())
}

/// Unpack `archive` into `dest`, keeping unix modes and symlinks.
fn extract(archive: &Path, dest: &Path) -> ExecResult<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(std::io::BufReader::new(file))?;
    std::fs::create_dir_all(dest)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(rel) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!(target: "ranger.exec.chrome", name = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let out = dest.join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mode = entry.unix_mode();
        if mode.is_some_and(is_symlink_mode) {
            let mut target = String::new();
            entry.read_to_string(&mut target)?;
            make_symlink(&target, &out)?;
            continue;
        }

        let mut file = std::fs::File::create(&out)?;
        std::io::copy(&mut entry, &mut file)?;
        if let Some(mode) = mode {
            set_mode(&out, mode)?;
        }
    }
    Ok(())
}

fn is_symlink_mode(mode: u32) -> bool {
    mode & 0o170000 == 0o120000
}

#[cfg(target_family = "unix")]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(target_family = "windows")]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    // Windows archives carry no links; copy the target if it is already unpacked.
    let source = link.parent().map(|p| p.join(target)).unwrap_or_default();
    std::fs::copy(source, link).map(|_| ())
}

#[cfg(target_family = "unix")]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777))
}

#[cfg(target_family = "windows")]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl BinaryProvisioner for CacheProvisioner {
    async fn ensure(&self, version: &str) -> Result<PathBuf, ProvisionError> {
        let path = self.executable_path(version);
        trace!(target: "ranger.exec.chrome", path = %path.display(), "looking up binary");
        let failed = |reason: String| ProvisionError::Failed {
            version: version.to_string(),
            reason,
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => return Ok(path),
            Ok(_) => return Err(failed(format!("{} is not a file", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(failed(e.to_string())),
        }

        let Some(url) = self.download_url(version) else {
            return Err(ProvisionError::NotInstalled {
                version: version.to_string(),
                dir: self.install_dir(version),
            });
        };
        self.install(version, &url)
            .await
            .map_err(|e| failed(e.to_string()))
    }
}
