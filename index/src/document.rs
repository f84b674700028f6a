//! On-disk document format and the searchable fields derived from it.

use crate::error::Result;
use crate::error::VaultError;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use vault_query::normalize_tag;

/// A document file. Unknown fields and block types are tolerated so files
/// written by newer editors still index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading {
        #[serde(default = "default_heading_level")]
        level: u8,
        #[serde(default)]
        content: Vec<Inline>,
    },
    Paragraph {
        #[serde(default)]
        content: Vec<Inline>,
    },
    Quote {
        #[serde(default)]
        content: Vec<Inline>,
    },
    ListItem {
        #[serde(default)]
        content: Vec<Inline>,
        #[serde(default)]
        children: Vec<Block>,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default)]
        text: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Divider,
    #[serde(other)]
    Unknown,
}

fn default_heading_level() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    Text {
        #[serde(default)]
        text: String,
    },
    Link {
        href: String,
        #[serde(default)]
        content: Vec<Inline>,
    },
    #[serde(other)]
    Unknown,
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text { text: text.into() }
    }
}

impl Block {
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading {
            level,
            content: vec![Inline::text(text)],
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph {
            content: vec![Inline::text(text)],
        }
    }
}

/// A hyperlink found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub host: Option<String>,
}

/// Fields extracted from a document for the full-text and relational index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentProjection {
    pub title: String,
    pub headings: String,
    pub body: String,
    pub code: String,
    pub tags: Vec<String>,
    pub links: Vec<Link>,
    /// Raw image and link targets, resolved to assets by the indexer.
    pub references: Vec<String>,
    pub has_code: bool,
    pub has_links: bool,
}

impl DocumentProjection {
    /// Title falls back to the first heading, then to `file_stem`.
    pub fn from_document(document: &Document, file_stem: &str) -> Self {
        let mut collector = Collector::default();
        for block in &document.blocks {
            collector.block(block);
        }

        let title = document
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .or_else(|| collector.headings.first().cloned())
            .unwrap_or_else(|| file_stem.to_string());

        let mut seen = HashSet::new();
        let tags = document
            .tags
            .iter()
            .map(|tag| normalize_tag(tag))
            .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
            .collect();

        let has_code = !collector.code.is_empty();
        let has_links = !collector.links.is_empty();
        Self {
            title,
            headings: collector.headings.join("\n"),
            body: collector.body.join("\n"),
            code: collector.code.join("\n"),
            tags,
            links: collector.links,
            references: collector.references,
            has_code,
            has_links,
        }
    }
}

#[derive(Default)]
struct Collector {
    headings: Vec<String>,
    body: Vec<String>,
    code: Vec<String>,
    links: Vec<Link>,
    references: Vec<String>,
}

impl Collector {
    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading { content, .. } => {
                let text = self.inline_text(content);
                if !text.is_empty() {
                    self.headings.push(text);
                }
            }
            Block::Paragraph { content } | Block::Quote { content } => {
                let text = self.inline_text(content);
                self.push_body(text);
            }
            Block::ListItem { content, children } => {
                let text = self.inline_text(content);
                self.push_body(text);
                for child in children {
                    self.block(child);
                }
            }
            Block::Code { text, .. } => {
                if !text.trim().is_empty() {
                    self.code.push(text.clone());
                }
            }
            Block::Image { url, caption } => {
                self.reference(url);
                if let Some(caption) = caption {
                    self.push_body(caption.trim().to_string());
                }
            }
            Block::Divider | Block::Unknown => {}
        }
    }

    fn push_body(&mut self, text: String) {
        if !text.is_empty() {
            self.body.push(text);
        }
    }

    fn inline_text(&mut self, content: &[Inline]) -> String {
        let mut out = String::new();
        self.collect_inline(content, &mut out);
        out.trim().to_string()
    }

    fn collect_inline(&mut self, content: &[Inline], out: &mut String) {
        for inline in content {
            match inline {
                Inline::Text { text } => out.push_str(text),
                Inline::Link { href, content } => {
                    self.link(href);
                    self.collect_inline(content, out);
                }
                Inline::Unknown => {}
            }
        }
    }

    fn link(&mut self, href: &str) {
        let href = href.trim();
        if href.is_empty() {
            return;
        }
        self.reference(href);
        if self.links.iter().any(|link| link.url == href) {
            return;
        }
        let host = url::Url::parse(href)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));
        self.links.push(Link {
            url: href.to_string(),
            host,
        });
    }

    fn reference(&mut self, target: &str) {
        let target = target.trim();
        if !target.is_empty() && !self.references.iter().any(|r| r == target) {
            self.references.push(target.to_string());
        }
    }
}

/// Reads and parses a document file.
pub async fn read_document(path: &Path) -> Result<Document> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|source| VaultError::Document {
        path: path.display().to_string(),
        source,
    })
}

/// Writes a document so readers observe either the old or the new content.
pub async fn write_document(path: &Path, document: &Document) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(document)?;
    write_atomic(path, bytes).await
}

/// Writes to a temporary file next to `path` and renames it into place.
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let parent = path.parent().ok_or_else(|| {
            VaultError::InvalidPath(format!("{} has no parent directory", path.display()))
        })?;
        std::fs::create_dir_all(parent)?;
        let mut file = NamedTempFile::new_in(parent)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|err| VaultError::Io(err.error))?;
        Ok(())
    })
    .await?
}
