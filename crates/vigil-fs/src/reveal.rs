//! Revealing files in the platform's file manager.
//!
//! There is no single reliable way of doing this on every desktop so [`show_in_folder`] walks a
//! [`RevealChain`] of strategies, stopping at the first one which succeeds.

use std::{
    ffi::OsString,
    fmt, io,
    path::{self, Path, PathBuf},
    process::{Command, Stdio},
};

#[cfg(not(target_os = "macos"))]
use std::thread;

// === RevealTarget === //

/// The file to reveal, resolved to an absolute path, alongside its containing directory.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RevealTarget {
    pub file: PathBuf,
    pub dir: PathBuf,
}

impl RevealTarget {
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = path::absolute(path)?;
        let dir = file.parent().map_or_else(|| file.clone(), Path::to_path_buf);

        Ok(Self { file, dir })
    }
}

// === Reveal === //

/// One way of showing a file to the user.
pub trait Reveal {
    fn name(&self) -> &'static str;

    /// Attempts to reveal `target`, returning whether it worked.
    fn reveal(&self, target: &RevealTarget) -> bool;
}

/// An ordered list of [`Reveal`] strategies.
#[derive(Default)]
pub struct RevealChain {
    strategies: Vec<Box<dyn Reveal>>,
}

impl fmt::Debug for RevealChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|strategy| strategy.name()))
            .finish()
    }
}

impl RevealChain {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The strategies appropriate for the current platform, in order of preference.
    pub fn platform() -> Self {
        let chain = Self::empty();

        #[cfg(all(unix, not(target_os = "macos")))]
        let chain = {
            #[cfg(feature = "dbus")]
            let chain = chain.with(FileManagerBus).with(PortalOpenDirectory);

            chain
                .with(DefaultFileManager)
                .with(GioOpen)
                .with(XdgOpen)
        };

        #[cfg(target_os = "macos")]
        let chain = chain.with(Finder);

        #[cfg(windows)]
        let chain = chain.with(Explorer);

        chain
    }

    pub fn with(mut self, strategy: impl Reveal + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Tries each strategy in turn, returning `true` on the first success.
    pub fn show(&self, path: &Path) -> bool {
        let target = match RevealTarget::new(path) {
            Ok(target) => target,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to resolve path to reveal");
                return false;
            }
        };

        for strategy in &self.strategies {
            if strategy.reveal(&target) {
                tracing::debug!(strategy = strategy.name(), path = %target.file.display(), "revealed file");
                return true;
            }

            tracing::debug!(strategy = strategy.name(), "reveal strategy failed");
        }

        tracing::warn!(path = %target.file.display(), "every reveal strategy failed");
        false
    }
}

/// Shows `path` in the platform's file manager, selecting it where supported.
pub fn show_in_folder(path: impl AsRef<Path>) -> bool {
    RevealChain::platform().show(path.as_ref())
}

// === Process helpers === //

fn quiet(command: &mut Command) -> &mut Command {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
}

fn run_to_success(command: &mut Command) -> bool {
    quiet(command)
        .status()
        .is_ok_and(|status| status.success())
}

#[cfg(not(target_os = "macos"))]
fn spawn_detached(command: &mut Command) -> bool {
    match quiet(command).spawn() {
        Ok(mut child) => {
            // Reap the child whenever it exits so it does not linger as a zombie.
            thread::spawn(move || {
                let _ = child.wait();
            });
            true
        }
        Err(_) => false,
    }
}

/// Percent-encodes `path` into a `file://` URI.
#[cfg(unix)]
pub fn file_uri(path: &Path) -> String {
    use std::{fmt::Write as _, os::unix::ffi::OsStrExt as _};

    let mut uri = String::from("file://");

    for &byte in path.as_os_str().as_bytes() {
        if byte.is_ascii_alphanumeric() || b"/-._~".contains(&byte) {
            uri.push(byte as char);
        } else {
            _ = write!(uri, "%{byte:02X}");
        }
    }

    uri
}

// === Linux strategies === //

#[cfg(all(unix, not(target_os = "macos"), feature = "dbus"))]
mod bus {
    use std::{collections::HashMap, fs::File, os::fd::AsFd as _};

    use zbus::{
        blocking::Connection,
        zvariant::{Fd, Value},
    };

    use super::{Reveal, RevealTarget, file_uri};

    /// `org.freedesktop.FileManager1.ShowItems` over the session bus.
    #[derive(Debug, Copy, Clone)]
    pub struct FileManagerBus;

    impl Reveal for FileManagerBus {
        fn name(&self) -> &'static str {
            "file-manager-bus"
        }

        fn reveal(&self, target: &RevealTarget) -> bool {
            match show_items(target) {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(%err, "FileManager1.ShowItems call failed");
                    false
                }
            }
        }
    }

    fn show_items(target: &RevealTarget) -> zbus::Result<()> {
        Connection::session()?.call_method(
            Some("org.freedesktop.FileManager1"),
            "/org/freedesktop/FileManager1",
            Some("org.freedesktop.FileManager1"),
            "ShowItems",
            &(vec![file_uri(&target.file)], ""),
        )?;

        Ok(())
    }

    /// The desktop portal's `OpenDirectory`, handed a descriptor of the file itself.
    #[derive(Debug, Copy, Clone)]
    pub struct PortalOpenDirectory;

    impl Reveal for PortalOpenDirectory {
        fn name(&self) -> &'static str {
            "portal"
        }

        fn reveal(&self, target: &RevealTarget) -> bool {
            let file = match File::open(&target.file) {
                Ok(file) => file,
                Err(err) => {
                    tracing::debug!(path = %target.file.display(), %err, "failed to open file for the portal");
                    return false;
                }
            };

            match open_directory(&file) {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(%err, "OpenURI.OpenDirectory call failed");
                    false
                }
            }
        }
    }

    fn open_directory(file: &File) -> zbus::Result<()> {
        Connection::session()?.call_method(
            Some("org.freedesktop.portal.Desktop"),
            "/org/freedesktop/portal/desktop",
            Some("org.freedesktop.portal.OpenURI"),
            "OpenDirectory",
            &("", Fd::from(file.as_fd()), HashMap::<&str, Value<'_>>::new()),
        )?;

        Ok(())
    }
}

#[cfg(all(unix, not(target_os = "macos"), feature = "dbus"))]
pub use self::bus::{FileManagerBus, PortalOpenDirectory};

/// Launches the default directory handler directly, if it is a file manager known to support
/// selecting a file.
#[cfg(all(unix, not(target_os = "macos")))]
#[derive(Debug, Copy, Clone)]
pub struct DefaultFileManager;

#[cfg(all(unix, not(target_os = "macos")))]
impl Reveal for DefaultFileManager {
    fn name(&self) -> &'static str {
        "default-file-manager"
    }

    fn reveal(&self, target: &RevealTarget) -> bool {
        let Ok(output) = Command::new("xdg-mime")
            .args(["query", "default", "inode/directory"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        else {
            return false;
        };

        let desktop_id = String::from_utf8_lossy(&output.stdout);

        let Some((program, args)) = file_manager_command(desktop_id.trim(), &target.file) else {
            return false;
        };

        spawn_detached(Command::new(program).args(args))
    }
}

/// Maps a desktop entry id to the command which opens that file manager with `file` selected.
pub fn file_manager_command(desktop_id: &str, file: &Path) -> Option<(&'static str, Vec<OsString>)> {
    let file = file.as_os_str().to_os_string();

    let command = match desktop_id {
        "dolphin.desktop" | "org.kde.dolphin.desktop" => ("dolphin", vec!["--select".into(), file]),
        "nautilus.desktop" | "org.gnome.Nautilus.desktop" | "nautilus-folder-handler.desktop" => {
            ("nautilus", vec![file])
        }
        "nemo.desktop" => ("nemo", vec!["--no-desktop".into(), file]),
        "konqueror.desktop" | "kfmclient_dir.desktop" => {
            ("konqueror", vec!["--select".into(), file])
        }
        _ => return None,
    };

    Some(command)
}

/// Opens the containing directory's URI with its default handler.
#[cfg(all(unix, not(target_os = "macos")))]
#[derive(Debug, Copy, Clone)]
pub struct GioOpen;

#[cfg(all(unix, not(target_os = "macos")))]
impl Reveal for GioOpen {
    fn name(&self) -> &'static str {
        "gio-open"
    }

    fn reveal(&self, target: &RevealTarget) -> bool {
        run_to_success(Command::new("gio").arg("open").arg(file_uri(&target.dir)))
    }
}

/// Opens the containing directory with the generic desktop opener.
#[cfg(all(unix, not(target_os = "macos")))]
#[derive(Debug, Copy, Clone)]
pub struct XdgOpen;

#[cfg(all(unix, not(target_os = "macos")))]
impl Reveal for XdgOpen {
    fn name(&self) -> &'static str {
        "xdg-open"
    }

    fn reveal(&self, target: &RevealTarget) -> bool {
        run_to_success(Command::new("xdg-open").arg(&target.dir))
    }
}

// === Other platforms === //

#[cfg(target_os = "macos")]
#[derive(Debug, Copy, Clone)]
pub struct Finder;

#[cfg(target_os = "macos")]
impl Reveal for Finder {
    fn name(&self) -> &'static str {
        "finder"
    }

    fn reveal(&self, target: &RevealTarget) -> bool {
        run_to_success(Command::new("open").arg("-R").arg(&target.file))
    }
}

#[cfg(windows)]
#[derive(Debug, Copy, Clone)]
pub struct Explorer;

#[cfg(windows)]
impl Reveal for Explorer {
    fn name(&self) -> &'static str {
        "explorer"
    }

    fn reveal(&self, target: &RevealTarget) -> bool {
        let mut select = OsString::from("/select,");
        select.push(&target.file);

        spawn_detached(Command::new("explorer").arg(select))
    }
}
