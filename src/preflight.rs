//! Checks run before a composite starts: external tools and free disk space

use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tracing::{debug, warn};

use crate::config::ToolsConfig;
use crate::error::{ResourceError, Result, ToolError};

/// Locate `program` the way a shell would
///
/// Anything with a directory component is checked as given, bare names are
/// searched on `PATH`.
pub fn find_tool(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return is_executable(program).then(|| program.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Every tool a composite run invokes must be present
pub fn check_tools(tools: &ToolsConfig) -> Result<()> {
    for program in [
        &tools.ffmpeg,
        &tools.ffprobe,
        &tools.compositor,
        &tools.batch_runner,
        &tools.sequence_encoder,
    ] {
        match find_tool(program) {
            Some(found) => debug!(tool = %found.display(), "Found tool"),
            None => {
                return Err(ToolError::NotFound {
                    tool: program.display().to_string(),
                }
                .into())
            }
        }
    }
    Ok(())
}

/// Only ffmpeg and ffprobe are needed to analyze or normalize single tracks
pub fn check_media_tools(tools: &ToolsConfig) -> Result<()> {
    for program in [&tools.ffmpeg, &tools.ffprobe] {
        if find_tool(program).is_none() {
            return Err(ToolError::NotFound {
                tool: program.display().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Space available to the current user on the volume holding `path`, in MB
pub fn available_space_mb(path: &Path) -> Option<u64> {
    let path = path.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();

    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space() / (1024 * 1024))
}

/// Fail unless the volume holding `path` has `required_mb` free
///
/// A volume that can't be identified is let through with a warning.
pub fn check_disk_space(path: &Path, required_mb: u64) -> Result<()> {
    match available_space_mb(path) {
        Some(available_mb) if available_mb < required_mb => Err(ResourceError::InsufficientDiskSpace {
            path: path.display().to_string(),
            required_mb,
            available_mb,
        }
        .into()),
        Some(available_mb) => {
            debug!(path = %path.display(), available_mb, "Disk space ok");
            Ok(())
        }
        None => {
            warn!(path = %path.display(), "Could not determine free disk space, continuing");
            Ok(())
        }
    }
}
