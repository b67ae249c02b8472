//! Single-flight article generation with an on-disk cache.
//!
//! A request for an article is served from, in order of preference:
//! the stable cache file, a generation already in flight for the same
//! id, or a new generation started by this request. Readers attached to
//! an in-flight generation replay its output as it is written; a reader
//! still lagging when the output file is force-closed picks up the rest
//! from the promoted stable file.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;
use std::time::Instant;

use tempfile::TempPath;
use tracing::{debug, error, info, warn};

use crate::cache::publisher::{CachePub, PubState};
use crate::error::{NewsError, Result};
use crate::generator::generate_message;
use crate::model::CoreMsgId;
use crate::nntp::{ArticleDestination, ArticleSink, CopyMode, Responder};
use crate::store::{FileStore, PostSource};

/// Lifecycle of one in-flight generation, as seen by its readers.
enum Generation {
    Generating,
    Finished(std::result::Result<(), Arc<NewsError>>),
}

/// State shared between a generation worker and its readers.
struct CacheObject {
    state: Mutex<Generation>,
    cond: Condvar,
    publisher: CachePub,
}

impl CacheObject {
    fn new(file: File) -> Self {
        Self {
            state: Mutex::new(Generation::Generating),
            cond: Condvar::new(),
            publisher: CachePub::new(file),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Generation> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of promotion and wake every waiter.
    fn mark_finished(&self, outcome: std::result::Result<(), Arc<NewsError>>) {
        *self.lock() = Generation::Finished(outcome);
        self.cond.notify_all();
    }

    /// Block until the worker has promoted (or failed to promote) the
    /// article.
    fn wait_finished(&self) -> Result<()> {
        let mut state = self.lock();
        loop {
            match &*state {
                Generation::Generating => {
                    state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                Generation::Finished(Ok(())) => return Ok(()),
                Generation::Finished(Err(e)) => return Err(NewsError::Generation(Arc::clone(e))),
            }
        }
    }
}

/// Article cache over a [`FileStore`], generating from a [`PostSource`].
pub struct ArticleCache {
    store: FileStore,
    posts: Arc<dyn PostSource>,
    wip: RwLock<HashMap<CoreMsgId, Arc<CacheObject>>>,
}

impl ArticleCache {
    pub fn new(store: FileStore, posts: Arc<dyn PostSource>) -> Self {
        Self {
            store,
            posts,
            wip: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Number of generations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.wip_read().len()
    }

    fn wip_read(&self) -> RwLockReadGuard<'_, HashMap<CoreMsgId, Arc<CacheObject>>> {
        self.wip.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn wip_write(&self) -> RwLockWriteGuard<'_, HashMap<CoreMsgId, Arc<CacheObject>>> {
        self.wip.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the article number of `id` and serve it into `sink`.
    ///
    /// `STAT` requests are answered from the post source alone.
    pub fn obtain_by_msgid<R: Responder>(self: &Arc<Self>, id: &CoreMsgId, sink: &mut ArticleSink<R>) -> Result<()> {
        let number = self
            .posts
            .article_number(id)?
            .ok_or_else(|| NewsError::NotFound(id.to_string()))?;
        if sink.mode() == CopyMode::Stat {
            return sink.stat(number, id);
        }
        self.obtain(id, number, sink)
    }

    /// Deliver the complete article `id` into `dest`.
    ///
    /// A `Stat` destination is answered immediately; nothing is read or
    /// generated.
    pub fn obtain(self: &Arc<Self>, id: &CoreMsgId, number: u64, dest: &mut dyn ArticleDestination) -> Result<()> {
        if dest.copy_mode() == CopyMode::Stat {
            dest.copy_from(&mut io::empty(), number, id)?;
            return Ok(());
        }
        let in_flight = self.wip_read().get(id).cloned();
        let obj = match in_flight {
            Some(obj) => {
                debug!(msgid = %id, "Joining in-flight generation");
                obj
            }
            None => {
                if self.serve_stable(id, number, dest)? {
                    return Ok(());
                }
                match self.start_or_join(id)? {
                    Some(obj) => obj,
                    None => {
                        if self.serve_stable(id, number, dest)? {
                            return Ok(());
                        }
                        return Err(NewsError::Inconsistent(format!("cached article <{id}> vanished")));
                    }
                }
            }
        };
        self.attach(&obj, id, number, dest)
    }

    /// Copy the stable cache file, if there is one.
    fn serve_stable(&self, id: &CoreMsgId, number: u64, dest: &mut dyn ArticleDestination) -> Result<bool> {
        let path = self.store.article_path(id);
        match File::open(&path) {
            Ok(mut f) => {
                debug!(msgid = %id, path = %path.display(), "Serving cached article");
                dest.copy_from(&mut f, number, id)?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(NewsError::io(path, e)),
        }
    }

    /// Register a new generation for `id`, or return the one another
    /// request registered first.
    ///
    /// Returns `None` when the article was promoted by a generation that
    /// ended after the caller's cache probe; the stable file is complete.
    fn start_or_join(self: &Arc<Self>, id: &CoreMsgId) -> Result<Option<Arc<CacheObject>>> {
        let (file, temp) = self.store.temp_file("article-")?.into_parts();

        let obj = {
            let mut wip = self.wip_write();
            match wip.entry(id.clone()) {
                Entry::Occupied(winner) => {
                    debug!(msgid = %id, "Lost registration race; attaching to winner");
                    return Ok(Some(Arc::clone(winner.get())));
                }
                Entry::Vacant(slot) => {
                    // Generations are promoted before they are unregistered,
                    // so one that ended since the caller's probe has left its
                    // file behind.
                    if self.store.article_path(id).exists() {
                        debug!(msgid = %id, "Article promoted meanwhile; not regenerating");
                        return Ok(None);
                    }
                    let obj = Arc::new(CacheObject::new(file));
                    slot.insert(Arc::clone(&obj));
                    obj
                }
            }
        };

        let cache = Arc::clone(self);
        let worker_obj = Arc::clone(&obj);
        let worker_id = id.clone();
        let spawned = thread::Builder::new()
            .name("article-gen".into())
            .spawn(move || cache.run_generation(worker_id, worker_obj, temp));
        if let Err(e) = spawned {
            error!(msgid = %id, error = %e, "Failed to start generation worker");
            self.unregister(id, &obj);
            let err = Arc::new(NewsError::io("<worker>", e));
            obj.publisher.cancel(NewsError::Inconsistent("generation worker did not start".into()));
            // Nothing was written; a failed sync is irrelevant here.
            let _ = obj.publisher.close();
            obj.mark_finished(Err(Arc::clone(&err)));
            return Err(NewsError::Generation(err));
        }
        Ok(Some(obj))
    }

    /// Copy from a live generation, resuming from the stable file if the
    /// stream is force-closed first.
    fn attach(&self, obj: &CacheObject, id: &CoreMsgId, number: u64, dest: &mut dyn ArticleDestination) -> Result<()> {
        let mut cursor = obj.publisher.replay();
        match dest.copy_from(&mut cursor, number, id) {
            Ok(_) => return Ok(()),
            Err(NewsError::PublisherClosed) => {}
            Err(e) => return Err(e),
        }
        let offset = cursor.position();

        match obj.publisher.state() {
            PubState::Finished => {}
            PubState::Canceled(e) => return Err(NewsError::Generation(e)),
            PubState::Running => {
                return Err(NewsError::Inconsistent(format!(
                    "publisher for <{id}> closed before reaching a terminal state"
                )));
            }
        }
        obj.wait_finished()?;

        let path = self.store.article_path(id);
        let mut f = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(NewsError::Inconsistent(format!(
                    "promoted article <{id}> missing at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(NewsError::io(path, e)),
        };
        f.seek(SeekFrom::Start(offset)).map_err(|e| NewsError::io(&path, e))?;
        debug!(msgid = %id, offset, "Resuming from promoted article");
        dest.copy_from(&mut f, number, id)?;
        Ok(())
    }

    /// Generation worker: generate, close, promote, unregister, notify.
    fn run_generation(&self, id: CoreMsgId, obj: Arc<CacheObject>, temp: TempPath) {
        let started = Instant::now();
        let generated = panic::catch_unwind(AssertUnwindSafe(|| self.write_article(&id, &obj.publisher)))
            .unwrap_or_else(|payload| Err(NewsError::Inconsistent(panic_message(payload.as_ref()))));

        match generated {
            Ok(()) => obj.publisher.finish(),
            Err(e) => {
                error!(msgid = %id, error = %e, "Article generation failed");
                obj.publisher.cancel(e);
            }
        }
        let closed = obj.publisher.close();

        let mut outcome = match obj.publisher.state() {
            PubState::Finished => Ok(()),
            PubState::Canceled(e) => Err(e),
            PubState::Running => Err(Arc::new(NewsError::Inconsistent(
                "publisher still running after generation".into(),
            ))),
        };
        if outcome.is_ok() {
            if let Err(e) = closed {
                error!(msgid = %id, error = %e, "Failed to close generated article");
                outcome = Err(Arc::new(NewsError::io(temp.to_path_buf(), e)));
            }
        }

        if outcome.is_ok() {
            outcome = self.promote(&id, temp).map_err(Arc::new);
            if outcome.is_ok() {
                info!(
                    msgid = %id,
                    bytes = obj.publisher.written(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Generated article"
                );
            }
        } else {
            drop(temp);
        }

        self.unregister(&id, &obj);
        obj.mark_finished(outcome);
    }

    fn write_article(&self, id: &CoreMsgId, publisher: &CachePub) -> Result<()> {
        let post = self
            .posts
            .fetch_post(id)?
            .ok_or_else(|| NewsError::NotFound(id.to_string()))?;
        let mut w = BufWriter::new(publisher);
        if let Err(e) = generate_message(&mut w, &post, &self.store) {
            // Drop buffered output without flushing it.
            let _ = w.into_parts();
            return Err(e);
        }
        w.flush()?;
        Ok(())
    }

    /// Move the finished scratch file into the stable cache.
    fn promote(&self, id: &CoreMsgId, temp: TempPath) -> Result<()> {
        let dest = self.store.article_path(id);
        match self.store.persist_no_clobber(temp, &dest) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(msgid = %id, path = %dest.display(), "Article already cached; keeping existing file");
                Ok(())
            }
            Err(e) => Err(NewsError::io(dest, e)),
        }
    }

    fn unregister(&self, id: &CoreMsgId, obj: &Arc<CacheObject>) {
        let mut wip = self.wip_write();
        if wip.get(id).is_some_and(|cur| Arc::ptr_eq(cur, obj)) {
            wip.remove(id);
        }
    }

    /// Generate `id` straight into `w`, bypassing the cache.
    pub fn generate_uncached(&self, id: &CoreMsgId, w: &mut dyn Write) -> Result<()> {
        let post = self
            .posts
            .fetch_post(id)?
            .ok_or_else(|| NewsError::NotFound(id.to_string()))?;
        generate_message(w, &post, &self.store)
    }

    /// Whether `id` has a stable cache file.
    pub fn is_cached(&self, id: &CoreMsgId) -> bool {
        self.store.article_path(id).is_file()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    format!("generator panicked: {detail}")
}
