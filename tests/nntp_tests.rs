//! Integration tests for serving articles as NNTP responses.

use std::sync::Arc;

use boardnews::cache::ArticleCache;
use boardnews::model::{BodyObject, CoreMsgId, MessageInfo, PartInfo, PostInfo};
use boardnews::nntp::{ArticleSink, CopyMode, LineResponder};
use boardnews::store::{FileStore, MemoryPostSource};

fn setup() -> (tempfile::TempDir, Arc<ArticleCache>, CoreMsgId) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let posts = MemoryPostSource::new();
    posts
        .insert(PostInfo {
            message_id: Some(CoreMsgId::new("first@board").unwrap()),
            message: MessageInfo::default(),
            ..PostInfo::default()
        })
        .unwrap();
    let id = CoreMsgId::new("served@board").unwrap();
    posts
        .insert(PostInfo {
            message_id: Some(id.clone()),
            message: MessageInfo {
                title: "dots".into(),
                message: "first line\n.leading dot\nlast".into(),
                ..MessageInfo::default()
            },
            layout: PartInfo::with_body(BodyObject::ObjectIndex(0)),
            ..PostInfo::default()
        })
        .unwrap();
    (dir, Arc::new(ArticleCache::new(store, Arc::new(posts))), id)
}

fn serve(cache: &Arc<ArticleCache>, id: &CoreMsgId, mode: CopyMode) -> String {
    let mut sink = ArticleSink::new(mode, LineResponder::new(Vec::new())).with_buffer_size(7);
    cache.obtain_by_msgid(id, &mut sink).unwrap();
    String::from_utf8(sink.into_responder().into_inner()).unwrap()
}

#[test]
fn test_article_head_body() {
    let (_dir, cache, id) = setup();
    assert_eq!(
        serve(&cache, &id, CopyMode::Full),
        "220 2 <served@board>\r\nMessage-ID: <served@board>\r\nSubject: dots\r\n\r\n\
first line\r\n..leading dot\r\nlast\r\n.\r\n"
    );
    assert_eq!(
        serve(&cache, &id, CopyMode::Head),
        "221 2 <served@board>\r\nMessage-ID: <served@board>\r\nSubject: dots\r\n.\r\n"
    );
    assert_eq!(
        serve(&cache, &id, CopyMode::Body),
        "222 2 <served@board>\r\nfirst line\r\n..leading dot\r\nlast\r\n.\r\n"
    );
}

#[test]
fn test_stat_does_not_generate() {
    let (_dir, cache, id) = setup();
    assert_eq!(serve(&cache, &id, CopyMode::Stat), "223 2 <served@board>\r\n");
    assert!(!cache.is_cached(&id));
    assert_eq!(cache.in_flight(), 0);
}

#[test]
fn test_unknown_id_is_not_found_without_generation() {
    let (dir, cache, _) = setup();
    let unknown = CoreMsgId::new("nobody@board").unwrap();
    for mode in [CopyMode::Full, CopyMode::Head, CopyMode::Body, CopyMode::Stat] {
        let mut sink = ArticleSink::new(mode, LineResponder::new(Vec::new()));
        let err = cache.obtain_by_msgid(&unknown, &mut sink).unwrap_err();
        assert!(err.is_not_found());
        assert!(sink.responder().get_ref().is_empty());
    }
    assert_eq!(cache.in_flight(), 0);
    assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

#[test]
fn test_empty_article_body() {
    let (_dir, cache, _) = setup();
    let id = CoreMsgId::new("first@board").unwrap();
    assert_eq!(
        serve(&cache, &id, CopyMode::Body),
        "222 1 <first@board>\r\n.\r\n"
    );
    assert_eq!(
        serve(&cache, &id, CopyMode::Head),
        "221 1 <first@board>\r\nMessage-ID: <first@board>\r\n.\r\n"
    );
}
