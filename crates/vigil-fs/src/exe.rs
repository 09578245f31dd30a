use std::{env, ffi::OsString, path::PathBuf};

const DELETED_SUFFIX: &str = " (deleted)";

/// The path of the running executable.
///
/// On Linux this is the target of `/proc/self/exe`, minus the ` (deleted)` marker the kernel
/// appends once the binary has been replaced on disk. Where that link cannot be read, the first
/// command line argument is returned instead. `None` only if there is no such argument either.
pub fn current_executable_path() -> Option<PathBuf> {
    match resolve_running_binary() {
        Some(path) => Some(path),
        None => {
            tracing::debug!("falling back to the first command line argument for the executable path");
            env::args_os().next().map(PathBuf::from)
        }
    }
}

#[cfg(target_os = "linux")]
fn resolve_running_binary() -> Option<PathBuf> {
    match std::fs::read_link("/proc/self/exe") {
        Ok(path) => Some(strip_deleted_suffix(path)),
        Err(err) => {
            tracing::debug!(%err, "failed to read /proc/self/exe");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn resolve_running_binary() -> Option<PathBuf> {
    env::current_exe().ok()
}

/// Drops a trailing ` (deleted)` from `path`, unless a file by that exact name really exists.
pub fn strip_deleted_suffix(path: PathBuf) -> PathBuf {
    if path.exists() {
        return path;
    }

    let raw = path.into_os_string();

    match strip_suffix_os(&raw, DELETED_SUFFIX) {
        Some(stripped) => PathBuf::from(stripped),
        None => PathBuf::from(raw),
    }
}

#[cfg(unix)]
fn strip_suffix_os(raw: &OsString, suffix: &str) -> Option<OsString> {
    use std::os::unix::ffi::{OsStrExt as _, OsStringExt as _};

    raw.as_bytes()
        .strip_suffix(suffix.as_bytes())
        .map(|stripped| OsString::from_vec(stripped.to_vec()))
}

#[cfg(not(unix))]
fn strip_suffix_os(raw: &OsString, suffix: &str) -> Option<OsString> {
    raw.to_str()
        .and_then(|raw| raw.strip_suffix(suffix))
        .map(OsString::from)
}
