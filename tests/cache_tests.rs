//! Integration tests for the article cache: single-flight generation,
//! cache hits, no-clobber promotion and not-found handling.

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use boardnews::cache::ArticleCache;
use boardnews::error::{NewsError, Result};
use boardnews::model::{BodyObject, CoreMsgId, FileInfo, MessageInfo, PartInfo, PostInfo};
use boardnews::nntp::ArticleDestination;
use boardnews::store::{FileStore, MemoryPostSource, PostSource};

/// Post source that counts fetches and holds them until released.
struct GatedSource {
    inner: MemoryPostSource,
    fetches: AtomicUsize,
    open: Mutex<bool>,
    cond: Condvar,
}

impl GatedSource {
    fn new(inner: MemoryPostSource, open: bool) -> Self {
        Self {
            inner,
            fetches: AtomicUsize::new(0),
            open: Mutex::new(open),
            cond: Condvar::new(),
        }
    }

    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl PostSource for GatedSource {
    fn article_number(&self, id: &CoreMsgId) -> Result<Option<u64>> {
        self.inner.article_number(id)
    }

    fn fetch_post(&self, id: &CoreMsgId) -> Result<Option<PostInfo>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
        self.inner.fetch_post(id)
    }
}

/// Collects the raw article.
#[derive(Default)]
struct Collect(Vec<u8>);

impl ArticleDestination for Collect {
    fn copy_from(&mut self, src: &mut dyn Read, _number: u64, _msgid: &CoreMsgId) -> Result<u64> {
        let n = src.read_to_end(&mut self.0)?;
        Ok(n as u64)
    }
}

fn id(s: &str) -> CoreMsgId {
    CoreMsgId::new(s).unwrap()
}

/// A post with inline text and one large binary attachment.
fn big_post(store: &FileStore, msgid: &str) -> PostInfo {
    let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(store.file_path("big.bin").unwrap(), &data).unwrap();
    PostInfo {
        message_id: Some(id(msgid)),
        message: MessageInfo {
            title: "big".into(),
            message: "see attached".into(),
            ..MessageInfo::default()
        },
        files: vec![FileInfo {
            content_type: "application/octet-stream".into(),
            size: data.len() as u64,
            id: "big.bin".into(),
            ..FileInfo::default()
        }],
        layout: PartInfo {
            content_type: Some("multipart/mixed".into()),
            body: BodyObject::Parts(vec![
                PartInfo::with_body(BodyObject::ObjectIndex(0)),
                PartInfo {
                    content_type: Some("application/octet-stream".into()),
                    binary: true,
                    body: BodyObject::ObjectIndex(1),
                    ..PartInfo::default()
                },
            ]),
            ..PartInfo::default()
        },
        ..PostInfo::default()
    }
}

fn text_post(msgid: &str, text: &str) -> PostInfo {
    PostInfo {
        message_id: Some(id(msgid)),
        message: MessageInfo {
            message: text.into(),
            ..MessageInfo::default()
        },
        layout: PartInfo::with_body(BodyObject::ObjectIndex(0)),
        ..PostInfo::default()
    }
}

fn wait_idle(cache: &ArticleCache) {
    while cache.in_flight() > 0 {
        thread::sleep(Duration::from_millis(1));
    }
}

fn tmp_entries(store: &FileStore) -> usize {
    std::fs::read_dir(store.tmp_dir()).unwrap().count()
}

#[test]
fn test_single_flight() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let posts = MemoryPostSource::new();
    posts.insert(big_post(&store, "big@board")).unwrap();
    let source = Arc::new(GatedSource::new(posts, false));
    let cache = Arc::new(ArticleCache::new(store.clone(), source.clone()));
    let msgid = id("big@board");

    let outputs: Vec<Vec<u8>> = thread::scope(|s| {
        let readers: Vec<_> = (0..8)
            .map(|_| {
                let (cache, msgid) = (&cache, &msgid);
                s.spawn(move || {
                    let mut sink = Collect::default();
                    cache.obtain(msgid, 1, &mut sink).map(|()| sink.0)
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        source.release();
        readers.into_iter().map(|r| r.join().unwrap().unwrap()).collect()
    });

    assert_eq!(source.fetches(), 1);
    assert!(outputs[0].len() > 400_000);
    for out in &outputs[1..] {
        assert_eq!(out, &outputs[0]);
    }

    wait_idle(&cache);
    let stable = std::fs::read(store.article_path(&msgid)).unwrap();
    assert_eq!(stable, outputs[0]);
    assert_eq!(tmp_entries(&store), 0);
}

#[test]
fn test_refetch_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let posts = MemoryPostSource::new();
    posts.insert(big_post(&store, "again@board")).unwrap();
    let source = Arc::new(GatedSource::new(posts, true));
    let cache = Arc::new(ArticleCache::new(store, source.clone()));
    let msgid = id("again@board");

    let mut first = Collect::default();
    cache.obtain(&msgid, 1, &mut first).unwrap();
    wait_idle(&cache);
    assert!(cache.is_cached(&msgid));

    let mut second = Collect::default();
    cache.obtain(&msgid, 1, &mut second).unwrap();
    assert_eq!(first.0, second.0);
    assert_eq!(source.fetches(), 1);
}

#[test]
fn test_concurrent_generations_do_not_clobber() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let posts = MemoryPostSource::new();
    posts.insert(text_post("race@board", "same bytes either way")).unwrap();
    let source = Arc::new(GatedSource::new(posts, false));

    // Two caches over one store stand in for two processes.
    let a = Arc::new(ArticleCache::new(store.clone(), source.clone()));
    let b = Arc::new(ArticleCache::new(store.clone(), source.clone()));
    let msgid = id("race@board");

    let (out_a, out_b) = thread::scope(|s| {
        let msgid = &msgid;
        let ta = s.spawn(|| {
            let mut sink = Collect::default();
            a.obtain(msgid, 1, &mut sink).map(|()| sink.0)
        });
        let tb = s.spawn(|| {
            let mut sink = Collect::default();
            b.obtain(msgid, 1, &mut sink).map(|()| sink.0)
        });
        while source.fetches() < 2 {
            thread::sleep(Duration::from_millis(1));
        }
        source.release();
        (ta.join().unwrap().unwrap(), tb.join().unwrap().unwrap())
    });

    assert_eq!(out_a, out_b);
    wait_idle(&a);
    wait_idle(&b);
    assert_eq!(std::fs::read(store.article_path(&msgid)).unwrap(), out_a);
    assert_eq!(tmp_entries(&store), 0);
}

#[test]
fn test_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let source = Arc::new(GatedSource::new(MemoryPostSource::new(), true));
    let cache = Arc::new(ArticleCache::new(store.clone(), source.clone()));
    let msgid = id("missing@board");

    let err = cache.obtain(&msgid, 1, &mut Collect::default()).unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
    wait_idle(&cache);
    assert!(!cache.is_cached(&msgid));
    assert_eq!(tmp_entries(&store), 0);

    // A later request tries again rather than remembering the failure.
    let err = cache.obtain(&msgid, 1, &mut Collect::default()).unwrap_err();
    assert!(matches!(err, NewsError::Generation(_)));
    assert_eq!(source.fetches(), 2);
}

#[test]
fn test_size_mismatch_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let mut post = big_post(&store, "short@board");
    post.files[0].size += 1;
    let posts = MemoryPostSource::new();
    posts.insert(post).unwrap();
    let cache = Arc::new(ArticleCache::new(store.clone(), Arc::new(posts)));
    let msgid = id("short@board");

    let err = cache.obtain(&msgid, 1, &mut Collect::default()).unwrap_err();
    match err {
        NewsError::Generation(inner) => assert!(matches!(*inner, NewsError::SizeMismatch { .. })),
        other => panic!("unexpected {other:?}"),
    }
    wait_idle(&cache);
    assert!(!cache.is_cached(&msgid));
    assert_eq!(tmp_entries(&store), 0);
}
