//! Content-addressed file store: attachments, thumbnails and the stable
//! article cache, plus a scratch area for files still being written.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::{NamedTempFile, TempPath};
use tracing::debug;

use crate::error::{NewsError, Result};
use crate::model::{CoreMsgId, FileInfo};
use crate::store::AttachmentSource;

/// Suffix of cached article files.
const ARTICLE_SUFFIX: &str = "eml";

/// Directory layout rooted at one data directory.
///
/// ```text
/// <root>/files/     attachments, named <sha256>.<ext>
/// <root>/thumbs/    thumbnails
/// <root>/articles/  generated articles, named <sha256(msgid)>.eml
/// <root>/tmp/       scratch files awaiting promotion
/// ```
///
/// Promotion from `tmp/` is a rename, so all four must live on one
/// filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    files: PathBuf,
    thumbs: PathBuf,
    articles: PathBuf,
    tmp: PathBuf,
}

impl FileStore {
    /// Open a store, creating its directories as needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let store = Self {
            files: root.join("files"),
            thumbs: root.join("thumbs"),
            articles: root.join("articles"),
            tmp: root.join("tmp"),
            root,
        };
        for dir in [&store.files, &store.thumbs, &store.articles, &store.tmp] {
            fs::create_dir_all(dir).map_err(|e| NewsError::io(dir, e))?;
        }
        debug!(root = %store.root.display(), "Opened file store");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory; files here are never served.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp
    }

    /// Create a scratch file in `tmp/`. It is deleted when dropped unless
    /// promoted first.
    pub fn temp_file(&self, prefix: &str) -> Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(prefix)
            .tempfile_in(&self.tmp)
            .map_err(|e| NewsError::io(&self.tmp, e))
    }

    /// Rename a scratch file to `dest` unless `dest` already exists.
    ///
    /// An existing destination is reported as `ErrorKind::AlreadyExists`
    /// and left untouched; the scratch file is removed either way.
    pub fn persist_no_clobber(&self, temp: TempPath, dest: &Path) -> io::Result<()> {
        temp.persist_noclobber(dest).map_err(|e| e.error)
    }

    /// Path of an attachment by content-store id.
    pub fn file_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.files.join(id))
    }

    /// Path of a thumbnail by content-store id.
    pub fn thumb_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.thumbs.join(id))
    }

    /// Open an attachment for reading.
    pub fn open_file(&self, id: &str) -> Result<File> {
        let path = self.file_path(id)?;
        File::open(&path).map_err(|e| NewsError::io(path, e))
    }

    /// Stable cache file for an article.
    ///
    /// The name is the SHA-256 of the core message id, which bounds its
    /// length and keeps id characters out of the filesystem.
    pub fn article_path(&self, id: &CoreMsgId) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(id.as_str().as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        self.articles.join(format!("{hash}.{ARTICLE_SUFFIX}"))
    }
}

impl AttachmentSource for FileStore {
    fn open_attachment(&self, file: &FileInfo) -> io::Result<Box<dyn Read + '_>> {
        let f = self.open_file(&file.id)?;
        Ok(Box::new(f))
    }
}

/// Store ids are plain file names: ASCII alphanumerics, `.`, `-` and `_`,
/// not starting with a dot.
fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'));
    if ok {
        Ok(())
    } else {
        Err(NewsError::Inconsistent(format!("bad store id {id:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for sub in ["files", "thumbs", "articles", "tmp"] {
            assert!(dir.path().join(sub).is_dir(), "{sub} missing");
        }
        assert_eq!(store.root(), dir.path());
    }

    #[test]
    fn test_article_path_is_hashed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let path = store.article_path(&CoreMsgId::new("a/../b@x").unwrap());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), 64 + 4);
        assert!(name.ends_with(".eml"));
        assert_eq!(path.parent().unwrap(), dir.path().join("articles"));
    }

    #[test]
    fn test_persist_no_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let dest = store.file_path("abc.txt").unwrap();

        let mut first = store.temp_file("t-").unwrap();
        first.write_all(b"one").unwrap();
        store.persist_no_clobber(first.into_temp_path(), &dest).unwrap();

        let mut second = store.temp_file("t-").unwrap();
        second.write_all(b"two").unwrap();
        let err = store
            .persist_no_clobber(second.into_temp_path(), &dest)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&dest).unwrap(), b"one");
        assert_eq!(fs::read_dir(store.tmp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_path_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.file_path("../etc/passwd").is_err());
        assert!(store.file_path(".hidden").is_err());
        assert!(store.file_path("").is_err());
        assert!(store.open_file("missing.bin").is_err());
    }
}
