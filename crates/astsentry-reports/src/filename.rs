//! Path helpers for report locations.

use std::path::{Component, Path};

/// Artifact URI for `file`: relative to `root` when `file` lives below it,
/// always with `/` separators.
pub fn artifact_uri(file: &Path, root: Option<&Path>) -> String {
    let relative = root
        .and_then(|root| file.strip_prefix(root).ok())
        .unwrap_or(file);

    // The root component renders as an empty segment, giving the leading `/`.
    relative
        .components()
        .map(|component| match component {
            Component::RootDir => String::new(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
