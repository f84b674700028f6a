//! Rules that map files on disk to projects, documents and assets.
//!
//! The vault root contains project directories whose names start with the
//! project prefix (`@work`, `@home`, ...). Documents are files with the
//! document extension anywhere below a project directory; files under the
//! project's assets directory are assets. Hidden entries and everything
//! outside a project directory are ignored.

use crate::error::Result;
use crate::error::VaultError;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct VaultLayout {
    root: PathBuf,
    canonical_root: Option<PathBuf>,
    project_prefix: String,
    document_extension: String,
    assets_dir: String,
}

/// What a vault-relative path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultPath {
    Document {
        rel: String,
        project_alias: String,
        project_dir: String,
    },
    Asset {
        rel: String,
        project_alias: String,
        project_dir: String,
    },
    /// A top-level directory carrying the project prefix.
    ProjectDir {
        project_alias: String,
        dir_name: String,
    },
    Other,
}

impl VaultPath {
    pub fn is_document(&self) -> bool {
        matches!(self, VaultPath::Document { .. })
    }
}

impl VaultLayout {
    pub fn new(root: &Path, project_prefix: &str, document_extension: &str, assets_dir: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            canonical_root: std::fs::canonicalize(root).ok(),
            project_prefix: project_prefix.to_string(),
            document_extension: document_extension.to_string(),
            assets_dir: assets_dir.to_string(),
        }
    }

    /// Layout with the default prefix `@`, extension `json` and `assets` dir.
    pub fn with_defaults(root: &Path) -> Self {
        Self::new(root, "@", "json", "assets")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assets_dir(&self) -> &str {
        &self.assets_dir
    }

    /// Vault-relative, `/`-separated form of `path`.
    ///
    /// Relative inputs are taken to be relative to the root already.
    pub fn relative(&self, path: &Path) -> Result<String> {
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .ok()
                .or_else(|| {
                    self.canonical_root
                        .as_deref()
                        .and_then(|root| path.strip_prefix(root).ok())
                })
                .ok_or_else(|| {
                    VaultError::InvalidPath(format!(
                        "{} is outside the vault {}",
                        path.display(),
                        self.root.display()
                    ))
                })?
        } else {
            path
        };

        let mut segments = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(segment) => {
                    let segment = segment.to_str().ok_or_else(|| {
                        VaultError::InvalidPath(format!("{} is not valid UTF-8", path.display()))
                    })?;
                    segments.push(segment);
                }
                Component::CurDir => {}
                _ => {
                    return Err(VaultError::InvalidPath(format!(
                        "{} escapes the vault",
                        path.display()
                    )));
                }
            }
        }
        if segments.is_empty() {
            return Err(VaultError::InvalidPath(format!(
                "{} is the vault root",
                path.display()
            )));
        }
        Ok(segments.join("/"))
    }

    pub fn absolute(&self, rel: &str) -> PathBuf {
        rel.split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Alias for a project directory name, or `None` when the name lacks
    /// the prefix or nothing follows it.
    pub fn project_alias(&self, dir_name: &str) -> Option<String> {
        let alias = dir_name.strip_prefix(&self.project_prefix)?;
        if alias.is_empty() {
            None
        } else {
            Some(alias.to_string())
        }
    }

    pub fn project_dir_name(&self, alias: &str) -> String {
        format!("{}{alias}", self.project_prefix)
    }

    pub fn classify(&self, path: &Path) -> VaultPath {
        match self.relative(path) {
            Ok(rel) => self.classify_rel(&rel),
            Err(_) => VaultPath::Other,
        }
    }

    pub fn classify_rel(&self, rel: &str) -> VaultPath {
        let segments: Vec<&str> = rel.split('/').collect();
        if segments
            .iter()
            .any(|segment| segment.is_empty() || segment.starts_with('.'))
        {
            return VaultPath::Other;
        }
        let dir_name = segments[0];
        let Some(project_alias) = self.project_alias(dir_name) else {
            return VaultPath::Other;
        };
        let project_dir = dir_name.to_string();

        match segments.len() {
            1 => VaultPath::ProjectDir {
                project_alias,
                dir_name: project_dir,
            },
            len if segments[1] == self.assets_dir => {
                if len > 2 {
                    VaultPath::Asset {
                        rel: rel.to_string(),
                        project_alias,
                        project_dir,
                    }
                } else {
                    VaultPath::Other
                }
            }
            _ if self.is_document_name(segments[segments.len() - 1]) => VaultPath::Document {
                rel: rel.to_string(),
                project_alias,
                project_dir,
            },
            _ => VaultPath::Other,
        }
    }

    /// Whether `rel` is a project directory or lies below one, outside any
    /// hidden entry.
    pub fn in_project_tree(&self, rel: &str) -> bool {
        let mut segments = rel.split('/');
        let in_project = segments
            .next()
            .is_some_and(|first| !first.starts_with('.') && self.project_alias(first).is_some());
        in_project && segments.all(|segment| !segment.is_empty() && !segment.starts_with('.'))
    }

    fn is_document_name(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, extension)) => !stem.is_empty() && extension == self.document_extension,
            None => false,
        }
    }

    /// Resolves a URL found in a document to the vault-relative path of an
    /// asset in the same project.
    ///
    /// `assets/...` is resolved against the project directory, any other
    /// relative URL against the document's directory. Absolute URLs and
    /// paths leaving the project yield `None`.
    pub fn resolve_asset_reference(&self, doc_rel: &str, url: &str) -> Option<String> {
        if url.is_empty() || url.starts_with('/') || url::Url::parse(url).is_ok() {
            return None;
        }
        let url = url.split(['?', '#']).next().unwrap_or_default();
        let url = url.strip_prefix("./").unwrap_or(url);

        let VaultPath::Document {
            project_alias,
            project_dir,
            ..
        } = self.classify_rel(doc_rel)
        else {
            return None;
        };

        let mut segments: Vec<&str> = if url.split('/').next() == Some(self.assets_dir.as_str()) {
            vec![project_dir.as_str()]
        } else {
            let mut dir: Vec<&str> = doc_rel.split('/').collect();
            dir.pop();
            dir
        };
        for segment in url.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop()?;
                }
                other => segments.push(other),
            }
        }

        let resolved = segments.join("/");
        match self.classify_rel(&resolved) {
            VaultPath::Asset {
                project_alias: owner,
                ..
            } if owner == project_alias => Some(resolved),
            _ => None,
        }
    }
}
