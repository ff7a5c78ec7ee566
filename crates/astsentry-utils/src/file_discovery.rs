use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Suffix of serialized AST files.
pub const AST_SUFFIX: &str = ".ast.json";

/// Name of the list resource looked up inside AST directories.
pub const FILELIST_NAME: &str = "filelist";

/// Enumerates serialized AST files for a scan target.
///
/// A target is resolved as follows:
/// - a file ending in `.ast.json` is scanned as is
/// - any other file is read as a filelist
/// - a directory holding a `filelist` uses that list
/// - any other directory is searched recursively for `.ast.json` files
pub struct AstDiscovery {
    root_path: PathBuf,
    suffix: String,
}

impl AstDiscovery {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            suffix: AST_SUFFIX.to_string(),
        }
    }

    /// Match a different file suffix during directory discovery.
    pub fn with_suffix(root_path: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            suffix: suffix.into(),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn is_ast_file(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().ends_with(&self.suffix))
            .unwrap_or(false)
    }

    /// Resolve the root path to a list of AST files.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let path = &self.root_path;

        if path.is_file() {
            if self.is_ast_file(path) {
                return Ok(vec![path.clone()]);
            }
            return read_filelist(path);
        }

        if !path.is_dir() {
            anyhow::bail!("Path does not exist: {}", path.display());
        }

        let filelist = path.join(FILELIST_NAME);
        if filelist.is_file() {
            log::debug!("Using {}", filelist.display());
            return read_filelist(&filelist);
        }

        let mut files = Vec::new();
        self.visit_dirs(path, &mut |p: &Path| {
            if self.is_ast_file(p) {
                files.push(p.to_path_buf());
            }
        })
        .with_context(|| format!("Failed to walk {}", path.display()))?;

        files.sort();
        log::debug!("Discovered {} AST files under {}", files.len(), path.display());
        Ok(files)
    }

    /// Recursively visit directories and call callback for each file
    fn visit_dirs<F>(&self, dir: &Path, cb: &mut F) -> std::io::Result<()>
    where
        F: FnMut(&Path),
    {
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    self.visit_dirs(&path, cb)?;
                } else {
                    cb(&path);
                }
            }
        }
        Ok(())
    }
}

/// Read a filelist: one AST path per line, relative to the list's directory.
///
/// Blank lines and lines starting with `#` are skipped. Order is preserved.
pub fn read_filelist(path: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read filelist {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| base.join(line))
        .collect())
}
