//! Where posts come from: the board's database, or a stand-in for it.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{NewsError, Result};
use crate::model::{CoreMsgId, PostInfo};

/// Read access to stored posts.
pub trait PostSource: Send + Sync {
    /// Article number of `id` in the current group context, if it exists.
    fn article_number(&self, id: &CoreMsgId) -> Result<Option<u64>>;

    /// The structured post for `id`, if it exists.
    fn fetch_post(&self, id: &CoreMsgId) -> Result<Option<PostInfo>>;
}

/// Posts held in memory, numbered in insertion order.
#[derive(Debug, Default)]
pub struct MemoryPostSource {
    posts: RwLock<HashMap<CoreMsgId, (u64, PostInfo)>>,
}

impl MemoryPostSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a post and return its article number. A post already present
    /// under the same id is kept and its number returned.
    pub fn insert(&self, post: PostInfo) -> Result<u64> {
        let id = post
            .message_id
            .clone()
            .ok_or_else(|| NewsError::InvalidMsgId("post has no message id".into()))?;
        let mut posts = self
            .posts
            .write()
            .map_err(|_| NewsError::Inconsistent("post map lock poisoned".into()))?;
        let next = posts.len() as u64 + 1;
        let (number, _) = posts.entry(id).or_insert((next, post));
        Ok(*number)
    }

    pub fn len(&self) -> usize {
        self.posts.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PostSource for MemoryPostSource {
    fn article_number(&self, id: &CoreMsgId) -> Result<Option<u64>> {
        let posts = self
            .posts
            .read()
            .map_err(|_| NewsError::Inconsistent("post map lock poisoned".into()))?;
        Ok(posts.get(id).map(|(n, _)| *n))
    }

    fn fetch_post(&self, id: &CoreMsgId) -> Result<Option<PostInfo>> {
        let posts = self
            .posts
            .read()
            .map_err(|_| NewsError::Inconsistent("post map lock poisoned".into()))?;
        Ok(posts.get(id).map(|(_, p)| p.clone()))
    }
}

/// On-disk record of one post.
#[derive(Debug, Serialize, Deserialize)]
struct StoredPost {
    number: u64,
    post: PostInfo,
}

/// Posts stored as one JSON document each, named by the SHA-256 of the
/// message id.
#[derive(Debug)]
pub struct JsonPostSource {
    dir: PathBuf,
    insert_lock: Mutex<()>,
}

impl JsonPostSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| NewsError::io(&dir, e))?;
        Ok(Self {
            dir,
            insert_lock: Mutex::new(()),
        })
    }

    fn post_path(&self, id: &CoreMsgId) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(id.as_str().as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    fn load(&self, id: &CoreMsgId) -> Result<Option<StoredPost>> {
        let path = self.post_path(id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(NewsError::io(path, e)),
        };
        let stored = serde_json::from_reader(BufReader::new(file))?;
        Ok(Some(stored))
    }

    /// Store a post and return its article number. Posts are immutable: an
    /// existing record under the same id wins.
    pub fn insert(&self, post: &PostInfo) -> Result<u64> {
        let id = post
            .message_id
            .as_ref()
            .ok_or_else(|| NewsError::InvalidMsgId("post has no message id".into()))?;
        let _guard = self
            .insert_lock
            .lock()
            .map_err(|_| NewsError::Inconsistent("insert lock poisoned".into()))?;

        if let Some(existing) = self.load(id)? {
            debug!(msgid = %id, number = existing.number, "Post already stored");
            return Ok(existing.number);
        }

        let number = self.count()? as u64 + 1;
        let path = self.post_path(id);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| NewsError::io(&path, e))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer(&mut w, &StoredPost {
            number,
            post: post.clone(),
        })?;
        w.flush().map_err(|e| NewsError::io(&path, e))?;
        info!(msgid = %id, number, "Stored post");
        Ok(number)
    }

    fn count(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir).map_err(|e| NewsError::io(&self.dir, e))?;
        let mut n = 0;
        for entry in entries {
            let entry = entry.map_err(|e| NewsError::io(&self.dir, e))?;
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                n += 1;
            }
        }
        Ok(n)
    }
}

impl PostSource for JsonPostSource {
    fn article_number(&self, id: &CoreMsgId) -> Result<Option<u64>> {
        Ok(self.load(id)?.map(|s| s.number))
    }

    fn fetch_post(&self, id: &CoreMsgId) -> Result<Option<PostInfo>> {
        Ok(self.load(id)?.map(|s| s.post))
    }
}
