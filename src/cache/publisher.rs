//! A growing scratch file shared between one writer and any number of
//! replaying readers.

use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::error::NewsError;

/// Terminal state of a publisher.
#[derive(Debug, Clone)]
pub enum PubState {
    /// Still being written.
    Running,
    /// Everything was written; the length is final.
    Finished,
    /// Generation failed; readers receive this error.
    Canceled(Arc<NewsError>),
}

struct Shared {
    written: u64,
    state: PubState,
    file: Option<Arc<File>>,
}

/// Broadcasts the bytes written to one file to readers created at any time.
///
/// Every [`ReplayCursor`] starts at offset 0 and blocks when it catches up
/// with the writer. Once the file is force-closed with
/// [`close`](CachePub::close), cursors fail with
/// [`NewsError::PublisherClosed`] even if they had not seen every byte;
/// the rest is expected to come from the promoted file.
pub struct CachePub {
    shared: Mutex<Shared>,
    cond: Condvar,
}

impl CachePub {
    pub fn new(file: File) -> Self {
        Self {
            shared: Mutex::new(Shared {
                written: 0,
                state: PubState::Running,
                file: Some(Arc::new(file)),
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A new reader starting at offset 0.
    pub fn replay(&self) -> ReplayCursor<'_> {
        ReplayCursor { publisher: self, pos: 0 }
    }

    /// Mark the stream complete. Ignored once a terminal state is set.
    pub fn finish(&self) {
        let mut shared = self.lock();
        if matches!(shared.state, PubState::Running) {
            shared.state = PubState::Finished;
            trace!(written = shared.written, "Publisher finished");
        }
        self.cond.notify_all();
    }

    /// Record a failure. Ignored once a terminal state is set.
    pub fn cancel(&self, err: NewsError) {
        let mut shared = self.lock();
        if matches!(shared.state, PubState::Running) {
            shared.state = PubState::Canceled(Arc::new(err));
        }
        self.cond.notify_all();
    }

    /// Force-close the file, waking every blocked reader.
    ///
    /// Data is synced before the handle is released; a sync failure is
    /// returned and must be treated as a failed generation.
    pub fn close(&self) -> io::Result<()> {
        let file = {
            let mut shared = self.lock();
            let file = shared.file.take();
            self.cond.notify_all();
            file
        };
        match file {
            Some(f) => f.sync_all(),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> PubState {
        self.lock().state.clone()
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.lock().written
    }
}

impl Write for &CachePub {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (file, offset) = {
            let shared = self.lock();
            if !matches!(shared.state, PubState::Running) {
                return Err(io::Error::other(NewsError::Inconsistent(
                    "write to a terminated publisher".into(),
                )));
            }
            match &shared.file {
                Some(f) => (Arc::clone(f), shared.written),
                None => return Err(io::Error::other(NewsError::PublisherClosed)),
            }
        };
        let n = match write_at(&file, buf, offset) {
            Ok(n) => n,
            Err(e) => {
                self.cancel(NewsError::io("<publisher>", io::Error::new(e.kind(), e.to_string())));
                return Err(e);
            }
        };
        let mut shared = self.lock();
        shared.written += n as u64;
        self.cond.notify_all();
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Independent read position over a [`CachePub`].
pub struct ReplayCursor<'a> {
    publisher: &'a CachePub,
    pos: u64,
}

impl ReplayCursor<'_> {
    /// Bytes delivered by this cursor so far.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for ReplayCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let publisher = self.publisher;
        let mut shared = publisher.lock();
        while self.pos >= shared.written
            && matches!(shared.state, PubState::Running)
            && shared.file.is_some()
        {
            shared = publisher
                .cond
                .wait(shared)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if self.pos < shared.written {
            let Some(file) = shared.file.clone() else {
                return Err(io::Error::other(NewsError::PublisherClosed));
            };
            let avail = (shared.written - self.pos).min(buf.len() as u64) as usize;
            drop(shared);
            let n = read_at(&file, &mut buf[..avail], self.pos)?;
            if n == 0 {
                return Err(io::Error::other(NewsError::Inconsistent(format!(
                    "published bytes missing at offset {}",
                    self.pos
                ))));
            }
            self.pos += n as u64;
            return Ok(n);
        }

        match &shared.state {
            PubState::Finished => Ok(0),
            PubState::Canceled(err) => Err(io::Error::other(NewsError::Generation(Arc::clone(err)))),
            PubState::Running => Err(io::Error::other(NewsError::PublisherClosed)),
        }
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}
