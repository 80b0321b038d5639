//! Download-style installation: fetch an archive or binary over HTTP, unpack
//! it under `~/.devrig/`, and locate the resulting executable (spec.md §6.1,
//! §11 "download" backend).
//!
//! Grounded in the teacher's `installers::url` + `libs::utilities::{assets,
//! compression,binary}` trio, collapsed into one module and generalized from
//! per-tool URLs to the URL *templates* a download-method `Installer`
//! declares once for every tool it serves.

use crate::core::installer::{ActionContext, Installer};
use crate::core::resource::{InstallerSpec, RuntimeSpec, ToolSpec};
use crate::core::state::{RuntimeState, ToolState, VersionKind};
use crate::{log_debug, log_info};
use anyhow::{anyhow, Context, Result};
use bzip2::read::BzDecoder;
use chrono::Utc;
use colored::Colorize;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tar::Archive;
use xz2::read::XzDecoder;
use zip::ZipArchive;

fn devrig_home() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".devrig"))
        .ok_or_else(|| anyhow!("could not determine home directory"))
}

fn download_to(url: &str, dest: &Path) -> Result<()> {
    log_info!("[Download] fetching {}", url.cyan());
    let response = ureq::get(url).call().with_context(|| format!("GET {url}"))?;
    let mut reader = response.into_reader();
    let mut file = File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
    std::io::copy(&mut reader, &mut file).with_context(|| format!("writing {}", dest.display()))?;
    log_debug!("[Download] saved to {}", dest.display());
    Ok(())
}

fn detect_archive_kind(path: &Path) -> &'static str {
    let name = path.file_name().and_then(|f| f.to_str()).unwrap_or("").to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        "tar.gz"
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        "tar.xz"
    } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
        "tar.bz2"
    } else if name.ends_with(".zip") {
        "zip"
    } else if name.ends_with(".tar") {
        "tar"
    } else {
        "binary"
    }
}

/// Extracts `archive` into `dest`, creating it if needed, and returns `dest`.
/// Unrecognised extensions are treated as a standalone binary and copied in
/// under their original filename.
fn extract(archive: &Path, dest: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest)?;
    match detect_archive_kind(archive) {
        "zip" => {
            let file = File::open(archive)?;
            let mut zip = ZipArchive::new(file)?;
            zip.extract(dest)?;
        }
        "tar.gz" => {
            let file = File::open(archive)?;
            Archive::new(GzDecoder::new(file)).unpack(dest)?;
        }
        "tar.xz" => {
            let file = File::open(archive)?;
            Archive::new(XzDecoder::new(file)).unpack(dest)?;
        }
        "tar.bz2" => {
            let file = File::open(archive)?;
            Archive::new(BzDecoder::new(file)).unpack(dest)?;
        }
        "tar" => {
            let file = File::open(archive)?;
            Archive::new(file).unpack(dest)?;
        }
        _ => {
            let name = archive.file_name().ok_or_else(|| anyhow!("archive path has no filename"))?;
            std::fs::copy(archive, dest.join(name))?;
        }
    }
    Ok(dest.to_path_buf())
}

/// Walks `dir` for the most likely executable: an exact (case-insensitive)
/// name match first, falling back to any file carrying the executable bit.
fn find_bin_paths(dir: &Path, name: &str) -> Vec<String> {
    let target = name.to_lowercase();
    let mut exact = Vec::new();
    let mut executable = Vec::new();

    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = entry.metadata() {
                if meta.permissions().mode() & 0o111 != 0 {
                    executable.push(path.to_path_buf());
                }
            }
        }
        if file_name.to_lowercase() == target {
            exact.push(path.to_path_buf());
        }
    }

    let winners = if !exact.is_empty() { exact } else { executable };
    winners.into_iter().map(|p| p.to_string_lossy().into_owned()).collect()
}

#[cfg(unix)]
fn make_executable(paths: &[String]) {
    use std::os::unix::fs::PermissionsExt;
    for p in paths {
        if let Ok(meta) = std::fs::metadata(p) {
            let mut perms = meta.permissions();
            perms.set_mode(perms.mode() | 0o111);
            let _ = std::fs::set_permissions(p, perms);
        }
    }
}

#[cfg(not(unix))]
fn make_executable(_paths: &[String]) {}

fn render_template(template: &str, name: &str, version: &str) -> String {
    template.replace("{name}", name).replace("{version}", version)
}

/// Built-in URL templates for the runtime families devrig knows how to fetch
/// directly. A real deployment would make this data-driven; devrig keeps it
/// to the handful of ecosystems the teacher itself shipped dedicated
/// installers for (`installers::go`, `installers::uv`), in the interest of
/// staying a thin reference implementation (spec.md §11 Non-goals).
fn builtin_runtime_template(runtime_type: &str) -> Option<&'static str> {
    match runtime_type {
        "go" => Some("https://go.dev/dl/go{version}.linux-amd64.tar.gz"),
        "node" => Some("https://nodejs.org/dist/v{version}/node-v{version}-linux-x64.tar.xz"),
        _ => None,
    }
}

/// Installs and removes `Runtime` resources whose runtime type has a known
/// download convention.
pub struct RuntimeDownloadInstaller;

impl Installer<RuntimeSpec, RuntimeState> for RuntimeDownloadInstaller {
    fn install(&self, _ctx: &ActionContext, resource: &RuntimeSpec, name: &str) -> Result<RuntimeState> {
        let version = resource.version.as_deref().unwrap_or("latest");
        let template = builtin_runtime_template(&resource.runtime_type)
            .ok_or_else(|| anyhow!("no download convention known for runtime type '{}'", resource.runtime_type))?;
        let url = render_template(template, name, version);

        let install_dir = devrig_home()?.join("runtime").join(name);
        std::fs::create_dir_all(&install_dir)?;

        let temp = tempfile::tempdir()?;
        let filename = Path::new(&url).file_name().and_then(|f| f.to_str()).unwrap_or("download");
        let archive_path = temp.path().join(filename);
        download_to(&url, &archive_path)?;

        extract(&archive_path, &install_dir)?;
        let bin_paths = find_bin_paths(&install_dir, name);
        make_executable(&bin_paths);

        Ok(RuntimeState {
            runtime_type: resource.runtime_type.clone(),
            version: version.to_string(),
            version_kind: VersionKind::Exact,
            spec_version: resource.version.clone(),
            install_path: install_dir.to_string_lossy().into_owned(),
            bin_paths,
            env: HashMap::new(),
            updated_at: Utc::now(),
        })
    }

    fn remove(&self, _ctx: &ActionContext, state: &RuntimeState, name: &str) -> Result<()> {
        let path = PathBuf::from(&state.install_path);
        if path.exists() {
            std::fs::remove_dir_all(&path).with_context(|| format!("removing runtime '{name}' at {}", path.display()))?;
        }
        Ok(())
    }
}

/// Installs `Tool` resources whose owning `Installer` uses the `download`
/// method. The URL template is read from the owning installer's
/// `commands["url"]` entry, the one piece of per-installer configuration a
/// download-method `Installer` needs beyond its name (spec.md §11.1).
pub struct ToolDownloadInstaller {
    installers: HashMap<String, InstallerSpec>,
}

impl ToolDownloadInstaller {
    pub fn new(installers: HashMap<String, InstallerSpec>) -> Self {
        Self { installers }
    }

    fn template_for(&self, tool: &ToolSpec) -> Result<&str> {
        let installer_ref = tool
            .installer_ref
            .as_deref()
            .ok_or_else(|| anyhow!("tool '{}' has no installer_ref", tool.name))?;
        let installer = self
            .installers
            .get(installer_ref)
            .ok_or_else(|| anyhow!("installer '{installer_ref}' not found for tool '{}'", tool.name))?;
        installer
            .commands
            .get("url")
            .map(String::as_str)
            .ok_or_else(|| anyhow!("download installer '{installer_ref}' has no 'url' command template"))
    }
}

impl Installer<ToolSpec, ToolState> for ToolDownloadInstaller {
    fn install(&self, _ctx: &ActionContext, resource: &ToolSpec, name: &str) -> Result<ToolState> {
        let template = self.template_for(resource)?;
        let version = resource.version.as_deref().unwrap_or("latest");
        let url = render_template(template, name, version);

        let install_dir = devrig_home()?.join("tool").join(name);
        std::fs::create_dir_all(&install_dir)?;

        let temp = tempfile::tempdir()?;
        let filename = Path::new(&url).file_name().and_then(|f| f.to_str()).unwrap_or("download");
        let archive_path = temp.path().join(filename);
        download_to(&url, &archive_path)?;

        extract(&archive_path, &install_dir)?;
        let bin_paths = find_bin_paths(&install_dir, name);
        make_executable(&bin_paths);

        Ok(ToolState {
            installer_ref: resource.installer_ref.clone(),
            runtime_ref: resource.runtime_ref.clone(),
            repository_ref: resource.repository_ref.clone(),
            version: version.to_string(),
            version_kind: VersionKind::Exact,
            spec_version: resource.version.clone(),
            install_path: install_dir.to_string_lossy().into_owned(),
            bin_paths,
            taint_reason: None,
            updated_at: Utc::now(),
        })
    }

    fn remove(&self, _ctx: &ActionContext, state: &ToolState, name: &str) -> Result<()> {
        let path = PathBuf::from(&state.install_path);
        if path.exists() {
            std::fs::remove_dir_all(&path).with_context(|| format!("removing tool '{name}' at {}", path.display()))?;
        }
        Ok(())
    }
}
