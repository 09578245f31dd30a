use std::{
    cell::RefCell,
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, Read as _, Write as _},
    path::Path,
    process::{Command, Stdio},
    rc::Rc,
};

use tempfile::TempDir;

use crate::{
    FsError, content_type_in, current_executable_path, delete_directory, flush_file_data,
    is_non_extension_mime_from, rename_with_overwrite, strip_deleted_suffix,
    reveal::{Reveal, RevealChain, RevealTarget, file_manager_command},
};

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
}

// === delete_directory === //

#[test]
fn delete_directory_removes_nested_tree() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");

    fs::create_dir_all(root.join("a/b/c")).unwrap();
    fs::create_dir_all(root.join("empty")).unwrap();
    write_file(&root.join("top.txt"), "top");
    write_file(&root.join("a/mid.txt"), "mid");
    write_file(&root.join("a/b/c/deep.txt"), "deep");

    delete_directory(&root).unwrap();

    assert!(!root.exists());
    assert!(tmp.path().exists());
}

#[test]
fn delete_directory_accepts_trailing_separator() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("trailing");

    fs::create_dir(&root).unwrap();
    write_file(&root.join("file"), "x");

    let mut with_slash = root.clone().into_os_string();
    with_slash.push("/");

    delete_directory(&with_slash).unwrap();
    assert!(!root.exists());
}

#[test]
fn delete_directory_of_missing_path_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope");

    let err = delete_directory(&missing).unwrap_err();
    assert!(matches!(err, FsError::Metadata { ref path, .. } if *path == missing));
}

#[test]
fn delete_directory_rejects_files() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("plain.txt");
    write_file(&file, "plain");

    let err = delete_directory(&file).unwrap_err();
    assert!(matches!(err, FsError::NotADirectory { .. }));
    assert!(file.exists());
}

#[cfg(unix)]
#[test]
fn delete_directory_does_not_follow_symlinks() {
    let tmp = TempDir::new().unwrap();
    let outside = tmp.path().join("outside");
    let root = tmp.path().join("root");

    fs::create_dir(&outside).unwrap();
    write_file(&outside.join("keep.txt"), "keep");
    fs::create_dir(&root).unwrap();
    std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

    delete_directory(&root).unwrap();

    assert!(!root.exists());
    assert!(outside.join("keep.txt").exists());
}

// === rename_with_overwrite === //

#[test]
fn rename_replaces_existing_target() {
    let tmp = TempDir::new().unwrap();
    let from = tmp.path().join("new.txt");
    let to = tmp.path().join("old.txt");

    write_file(&from, "fresh");
    write_file(&to, "stale");

    rename_with_overwrite(&from, &to).unwrap();

    assert!(!from.exists());
    assert_eq!(fs::read_to_string(&to).unwrap(), "fresh");
}

#[test]
fn rename_of_missing_source_fails() {
    let tmp = TempDir::new().unwrap();
    let from = tmp.path().join("ghost");
    let to = tmp.path().join("target");

    let err = rename_with_overwrite(&from, &to).unwrap_err();
    assert!(matches!(err, FsError::Rename { .. }));
    assert!(!to.exists());
}

// === flush_file_data === //

#[test]
fn flushed_buffered_writes_are_visible() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data.bin");

    let mut writer = BufWriter::new(File::create(&path).unwrap());
    writer.write_all(b"durable bytes").unwrap();
    flush_file_data(&mut writer).unwrap();

    let mut contents = String::new();
    File::open(&path)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();

    assert_eq!(contents, "durable bytes");
}

#[test]
fn flushing_a_bare_file_succeeds() {
    let tmp = TempDir::new().unwrap();
    let mut file = File::create(tmp.path().join("bare")).unwrap();

    file.write_all(b"x").unwrap();
    flush_file_data(&mut file).unwrap();
}

// === Content types === //

#[test]
fn missing_file_never_matches() {
    let tmp = TempDir::new().unwrap();

    assert!(!is_non_extension_mime_from(
        tmp.path().join("absent.png"),
        ["image/png"],
    ));
}

#[test]
fn directories_never_match() {
    let tmp = TempDir::new().unwrap();

    assert!(!is_non_extension_mime_from(tmp.path(), ["inode/directory"]));
}

#[test]
fn content_types_are_looked_up_exactly() {
    assert!(content_type_in("image/png", ["image/png"]));
    assert!(content_type_in("text/plain", vec!["image/png".to_string(), "text/plain".to_string()]));
    assert!(!content_type_in("image/png", ["IMAGE/PNG"]));
    assert!(!content_type_in("text/plain", ["text/html"]));
    assert!(!content_type_in("text/plain", [] as [&str; 0]));
}

fn sniffer_available() -> bool {
    Command::new("file")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

const PNG_HEADER: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
    0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', // IHDR chunk
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1
    0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE,
];

#[test]
fn sniffing_ignores_the_extension() {
    if !sniffer_available() {
        eprintln!("`file` is not installed, skipping");
        return;
    }

    let tmp = TempDir::new().unwrap();

    let disguised_image = tmp.path().join("image.txt");
    fs::write(&disguised_image, PNG_HEADER).unwrap();

    assert!(is_non_extension_mime_from(&disguised_image, ["image/png"]));
    assert!(!is_non_extension_mime_from(&disguised_image, ["text/plain"]));

    let disguised_text = tmp.path().join("photo.png");
    write_file(&disguised_text, "just some words\n");

    assert!(!is_non_extension_mime_from(&disguised_text, ["image/png"]));
    assert!(is_non_extension_mime_from(&disguised_text, ["text/plain"]));
}

// === Executable path === //

#[test]
fn executable_path_points_at_this_binary() {
    let path = current_executable_path().unwrap();

    assert!(path.is_absolute());
    assert!(path.exists());
    assert_eq!(
        path.canonicalize().unwrap(),
        std::env::current_exe().unwrap().canonicalize().unwrap(),
    );
}

#[test]
fn deleted_marker_is_stripped_from_missing_binaries() {
    let tmp = TempDir::new().unwrap();
    let marked = tmp.path().join("app (deleted)");

    assert_eq!(strip_deleted_suffix(marked), tmp.path().join("app"));
}

#[test]
fn deleted_marker_is_kept_when_the_file_exists() {
    let tmp = TempDir::new().unwrap();
    let literal = tmp.path().join("app (deleted)");
    write_file(&literal, "binary");

    assert_eq!(strip_deleted_suffix(literal.clone()), literal);
}

#[test]
fn paths_without_marker_are_untouched() {
    let tmp = TempDir::new().unwrap();
    let plain = tmp.path().join("app");

    assert_eq!(strip_deleted_suffix(plain.clone()), plain);
}

// === Reveal === //

struct Scripted {
    name: &'static str,
    succeeds: bool,
    log: Rc<RefCell<Vec<(&'static str, RevealTarget)>>>,
}

impl Reveal for Scripted {
    fn name(&self) -> &'static str {
        self.name
    }

    fn reveal(&self, target: &RevealTarget) -> bool {
        self.log.borrow_mut().push((self.name, target.clone()));
        self.succeeds
    }
}

#[test]
fn chain_stops_at_first_success() {
    let log = Rc::default();
    let step = |name, succeeds| Scripted {
        name,
        succeeds,
        log: Rc::clone(&log),
    };

    let chain = RevealChain::empty()
        .with(step("first", false))
        .with(step("second", true))
        .with(step("third", true));

    assert_eq!(chain.len(), 3);
    assert!(chain.show(Path::new("/tmp/some/file.txt")));

    let names = log.borrow().iter().map(|(name, _)| *name).collect::<Vec<_>>();
    assert_eq!(names, ["first", "second"]);
}

#[test]
fn chain_reports_total_failure() {
    let log = Rc::default();
    let chain = RevealChain::empty().with(Scripted {
        name: "only",
        succeeds: false,
        log: Rc::clone(&log),
    });

    assert!(!chain.show(Path::new("/tmp/file")));
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn empty_chain_fails() {
    let chain = RevealChain::empty();

    assert!(chain.is_empty());
    assert!(!chain.show(Path::new("/tmp/file")));
}

#[test]
fn target_is_absolute_with_parent_dir() {
    let target = RevealTarget::new(Path::new("nested/file.txt")).unwrap();

    assert!(target.file.is_absolute());
    assert!(target.file.ends_with("nested/file.txt"));
    assert_eq!(target.dir, target.file.parent().unwrap());
    assert!(target.dir.ends_with("nested"));
}

#[test]
fn chain_debug_lists_strategy_names() {
    let chain = RevealChain::empty().with(Scripted {
        name: "mock",
        succeeds: true,
        log: Rc::default(),
    });

    assert_eq!(format!("{chain:?}"), r#"["mock"]"#);
}

#[test]
fn known_file_managers_select_the_file() {
    let file = Path::new("/home/me/report.pdf");
    let os = |s: &str| OsString::from(s);

    assert_eq!(
        file_manager_command("org.kde.dolphin.desktop", file),
        Some(("dolphin", vec![os("--select"), os("/home/me/report.pdf")])),
    );
    assert_eq!(
        file_manager_command("org.gnome.Nautilus.desktop", file),
        Some(("nautilus", vec![os("/home/me/report.pdf")])),
    );
    assert_eq!(
        file_manager_command("nemo.desktop", file),
        Some(("nemo", vec![os("--no-desktop"), os("/home/me/report.pdf")])),
    );
    assert_eq!(
        file_manager_command("kfmclient_dir.desktop", file),
        Some(("konqueror", vec![os("--select"), os("/home/me/report.pdf")])),
    );
    assert_eq!(file_manager_command("thunar.desktop", file), None);
    assert_eq!(file_manager_command("", file), None);
}

#[cfg(unix)]
#[test]
fn file_uris_are_percent_encoded() {
    use crate::reveal::file_uri;

    assert_eq!(file_uri(Path::new("/tmp/plain-name_1.txt")), "file:///tmp/plain-name_1.txt");
    assert_eq!(file_uri(Path::new("/tmp/with space")), "file:///tmp/with%20space");
    assert_eq!(file_uri(Path::new("/tmp/50%")), "file:///tmp/50%25");
    assert_eq!(file_uri(Path::new("/tmp/é")), "file:///tmp/%C3%A9");
}

#[cfg(all(unix, not(target_os = "macos"), feature = "dbus"))]
#[test]
fn platform_chain_prefers_the_session_bus() {
    assert_eq!(
        format!("{:?}", RevealChain::platform()),
        r#"["file-manager-bus", "portal", "default-file-manager", "gio-open", "xdg-open"]"#,
    );
}

#[cfg(all(unix, not(target_os = "macos"), feature = "dbus"))]
#[test]
fn portal_needs_an_openable_file() {
    use crate::reveal::PortalOpenDirectory;

    let tmp = TempDir::new().unwrap();
    let target = RevealTarget::new(&tmp.path().join("missing.txt")).unwrap();

    assert!(!PortalOpenDirectory.reveal(&target));
}
