use std::{io, path::Path};

/// Whether the content type sniffed from `path`'s contents, ignoring its extension, is one of
/// `candidates`.
///
/// The sniffed type is lowercased before being looked up, and candidates are compared exactly, so
/// they must be spelled in lowercase. Files which cannot be sniffed never match.
pub fn is_non_extension_mime_from<I>(path: impl AsRef<Path>, candidates: I) -> bool
where
    I: IntoIterator<Item: AsRef<str>>,
{
    let path = path.as_ref();

    let sniffed = match sniff_content_type(path) {
        Ok(Some(sniffed)) => sniffed,
        Ok(None) => {
            tracing::debug!(path = %path.display(), "content type could not be guessed");
            return false;
        }
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "failed to run content sniffer");
            return false;
        }
    };

    tracing::debug!(path = %path.display(), content_type = %sniffed, "content type guessed");

    content_type_in(&sniffed, candidates)
}

pub(crate) fn content_type_in<I>(sniffed: &str, candidates: I) -> bool
where
    I: IntoIterator<Item: AsRef<str>>,
{
    candidates
        .into_iter()
        .any(|candidate| candidate.as_ref() == sniffed)
}

/// Sniffs `path`'s content type, lowercased. `Err` if the sniffer itself could not be run.
#[cfg(unix)]
fn sniff_content_type(path: &Path) -> io::Result<Option<String>> {
    use std::process::{Command, Stdio};

    if !path.is_file() {
        return Ok(None);
    }

    // `file` only looks at the contents, never at the name.
    let output = Command::new("file")
        .args(["--brief", "--mime-type", "--"])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()?;

    if !output.status.success() {
        return Ok(None);
    }

    let Ok(sniffed) = String::from_utf8(output.stdout) else {
        return Ok(None);
    };
    let sniffed = sniffed.trim().to_ascii_lowercase();

    Ok(sniffed.contains('/').then_some(sniffed))
}

#[cfg(not(unix))]
fn sniff_content_type(_path: &Path) -> io::Result<Option<String>> {
    Err(io::ErrorKind::Unsupported.into())
}
