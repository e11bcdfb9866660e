// Post model and the backing store.
// The file variant treats database.json as a whole-document blob: the
// collection is re-read on every access and rewritten in full on every
// mutation. Nothing is cached across requests.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;
use tokio::sync::RwLock;

use crate::config::{StorageBackend, StorageConfig};

/// A single blog entry. `id` is derived from `title` once at creation and
/// never re-derived afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// On-disk document: the full collection under a single top-level key.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    posts: Vec<Post>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON encoding failed: {0}")]
    Corrupt(#[from] serde_json::Error),
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern is valid"))
}

/// Derive the lookup id from a title: each whitespace run becomes a single
/// underscore. There is no uniqueness check; two posts whose titles
/// normalize to the same id collide.
pub fn derive_post_id(title: &str) -> String {
    whitespace_run().replace_all(title, "_").into_owned()
}

enum Backend {
    File { path: PathBuf },
    Memory { posts: RwLock<Vec<Post>> },
}

pub struct PostStore {
    backend: Backend,
}

impl PostStore {
    pub fn from_config(storage: &StorageConfig) -> Self {
        match storage.backend {
            StorageBackend::File => Self::file(&storage.db_file),
            StorageBackend::Memory => Self::memory(Vec::new()),
        }
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            backend: Backend::File {
                path: path.as_ref().to_path_buf(),
            },
        }
    }

    pub fn memory(posts: Vec<Post>) -> Self {
        Self {
            backend: Backend::Memory {
                posts: RwLock::new(posts),
            },
        }
    }

    /// Full collection, in stored order.
    pub async fn list(&self) -> Result<Vec<Post>, StoreError> {
        match &self.backend {
            Backend::File { path } => Ok(read_document(path).await?.posts),
            Backend::Memory { posts } => Ok(posts.read().await.clone()),
        }
    }

    /// First post with a matching id, if any.
    pub async fn find(&self, id: &str) -> Result<Option<Post>, StoreError> {
        Ok(self.list().await?.into_iter().find(|post| post.id == id))
    }

    /// Build a new post from `title`/`content` and append it. The file
    /// variant rewrites the whole document; two concurrent creates can each
    /// read the old collection and lose one of the appends. There is no
    /// locking discipline on the file.
    pub async fn create(&self, title: &str, content: &str) -> Result<Post, StoreError> {
        let post = Post {
            id: derive_post_id(title),
            title: title.to_string(),
            content: content.to_string(),
        };

        match &self.backend {
            Backend::File { path } => {
                let mut document = read_document(path).await?;
                document.posts.push(post.clone());
                write_document(path, &document).await?;
            }
            Backend::Memory { posts } => posts.write().await.push(post.clone()),
        }

        Ok(post)
    }
}

/// A missing file reads as the empty collection; the first write creates it.
async fn read_document(path: &Path) -> Result<Document, StoreError> {
    let json = match fs::read_to_string(path).await {
        Ok(json) => json,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Document::default()),
        Err(err) => return Err(StoreError::Io(err)),
    };
    Ok(serde_json::from_str(&json)?)
}

async fn write_document(path: &Path, document: &Document) -> Result<(), StoreError> {
    let json = serde_json::to_string(document)?;
    fs::write(path, json).await?;
    Ok(())
}
