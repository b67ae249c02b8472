//! Integration tests for the article codec: decode, generate, decode again.

use boardnews::generator::generate_message;
use boardnews::model::{BodyObject, PartInfo, PostInfo};
use boardnews::parser::ArticleProcessor;
use boardnews::store::{FileStore, NoThumbnailer};

fn store() -> (tempfile::TempDir, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    (dir, store)
}

fn ingest(store: &FileStore, article: &[u8]) -> PostInfo {
    let mut input = article;
    ArticleProcessor::default()
        .devour_article(store, &NoThumbnailer, &mut input)
        .unwrap()
        .commit(store)
        .unwrap()
}

fn generate(store: &FileStore, post: &PostInfo) -> Vec<u8> {
    let mut out = Vec::new();
    generate_message(&mut out, post, store).unwrap();
    out
}

/// Content types, bodies and byte flags of a layout, in document order.
fn shape(part: &PartInfo) -> String {
    let flags = format!(
        "{}{}{}",
        if part.binary { "B" } else { "-" },
        if part.has_null { "0" } else { "-" },
        if part.has_8bit { "8" } else { "-" }
    );
    let ct = part.content_type.as_deref().unwrap_or("");
    match &part.body {
        BodyObject::Empty => format!("{ct}({flags})=empty"),
        BodyObject::ObjectIndex(i) => format!("{ct}({flags})={i}"),
        BodyObject::Parts(children) => {
            let inner: Vec<String> = children.iter().map(shape).collect();
            format!("{ct}({flags})[{}]", inner.join(", "))
        }
    }
}

/// Generate `post`, decode the result and compare what a reader sees.
fn assert_roundtrip(store: &FileStore, post: &PostInfo) -> Vec<u8> {
    let wire = generate(store, post);
    let again = ingest(store, &wire);

    assert_eq!(again.message_id, post.message_id);
    assert_eq!(again.message.title, post.message.title);
    assert_eq!(again.message.message, post.message.message);
    let files = |p: &PostInfo| -> Vec<(String, u64)> {
        p.files.iter().map(|f| (f.id.clone(), f.size)).collect()
    };
    assert_eq!(files(&again), files(post));
    assert_eq!(shape(&again.layout), shape(&post.layout));
    wire
}

#[test]
fn test_plain_text() {
    let (_dir, store) = store();
    let post = ingest(
        &store,
        b"Message-ID: <rt1@board>\nSubject: plain\nDate: Tue, 1 Sep 2026 10:00:00 +0000\n\nhello\nworld\n",
    );
    assert_eq!(post.message.message, "hello\nworld");
    let wire = assert_roundtrip(&store, &post);
    let wire = String::from_utf8(wire).unwrap();
    assert!(wire.ends_with("\n\nhello\nworld\n"));
    assert!(!wire.contains("MIME-Version"));
}

#[test]
fn test_text_with_attachment() {
    let (_dir, store) = store();
    let article = b"Message-ID: <rt2@board>\n\
Subject: with file\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=zz\n\
\n\
--zz\n\
Content-Type: text/plain; charset=UTF-8\n\
\n\
caf\xc3\xa9\n\
--zz\n\
Content-Type: image/png; name=\"a.png\"\n\
Content-Disposition: attachment; filename=\"a.png\"\n\
Content-Transfer-Encoding: base64\n\
\n\
iVBORw0KGgo=\n\
--zz--\n";
    let post = ingest(&store, article);
    assert_eq!(post.files.len(), 1);
    assert_eq!(
        shape(&post.layout),
        "multipart/mixed(--8)[text/plain; charset=UTF-8(--8)=0, image/png; name=\"a.png\"(B--)=1]"
    );

    let wire = assert_roundtrip(&store, &post);
    let text = String::from_utf8_lossy(&wire);
    assert_eq!(text.matches("MIME-Version: 1.0").count(), 1);
    assert!(text.contains("Content-Transfer-Encoding: base64"));
    assert!(text.contains("Content-Transfer-Encoding: 8bit"));
}

#[test]
fn test_nested_multipart() {
    let (_dir, store) = store();
    let article = b"Message-ID: <rt3@board>\n\
Subject: nested\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=outer\n\
\n\
preamble is dropped\n\
--outer\n\
Content-Type: multipart/alternative; boundary=inner\n\
\n\
--inner\n\
Content-Type: text/plain; charset=UTF-8\n\
\n\
plain body\n\
--inner\n\
Content-Type: text/html; charset=UTF-8\n\
\n\
<p>html body</p>\n\
--inner--\n\
--outer\n\
Content-Type: application/octet-stream; name=\"blob.bin\"\n\
Content-Transfer-Encoding: base64\n\
\n\
AAECAwQF\n\
--outer--\n";
    let post = ingest(&store, article);
    assert_eq!(post.message.message, "plain body");
    assert_eq!(post.files.len(), 2);
    assert!(post.files[0].id.ends_with(".html"));
    assert_eq!(post.files[1].size, 6);
    assert_eq!(
        shape(&post.layout),
        "multipart/mixed(---)[multipart/alternative(---)[text/plain; charset=UTF-8(---)=0, \
text/html; charset=UTF-8(---)=1], application/octet-stream; name=\"blob.bin\"(B--)=2]"
    );
    assert_roundtrip(&store, &post);
}

#[test]
fn test_8bit_text() {
    let (_dir, store) = store();
    let post = ingest(
        &store,
        "Message-ID: <rt4@board>\nContent-Type: text/plain; charset=UTF-8\nContent-Transfer-Encoding: 8bit\n\nпривет, мир\n"
            .as_bytes(),
    );
    assert!(post.layout.has_8bit);
    assert!(post.files.is_empty());
    let wire = assert_roundtrip(&store, &post);
    let text = String::from_utf8(wire).unwrap();
    assert!(text.contains("Content-Transfer-Encoding: 8bit\n"));
    assert!(text.ends_with("\n\nпривет, мир\n"));
}

#[test]
fn test_text_with_nul() {
    let (_dir, store) = store();
    let post = ingest(
        &store,
        b"Message-ID: <rt5@board>\nContent-Type: text/plain\n\nbefore\x00after\n",
    );
    assert_eq!(post.message.message, "");
    assert_eq!(post.files.len(), 1);
    assert!(post.layout.has_null);
    let wire = assert_roundtrip(&store, &post);
    let text = String::from_utf8(wire).unwrap();
    assert!(text.contains("Content-Transfer-Encoding: quoted-printable\n"));
    assert!(text.contains("before=00after"));
}

#[test]
fn test_generated_article_parses_with_mail_parser() {
    let (_dir, store) = store();
    let article = b"Message-ID: <rt6@board>\n\
Subject: cross-check\n\
Content-Type: multipart/mixed; boundary=zz\n\
\n\
--zz\n\
\n\
just text\n\
--zz\n\
Content-Type: application/octet-stream; name=\"x.bin\"\n\
Content-Transfer-Encoding: base64\n\
\n\
/wABAgM=\n\
--zz--\n";
    let post = ingest(&store, article);
    let wire = generate(&store, &post);

    let parsed = mail_parser::MessageParser::default().parse(&wire[..]).unwrap();
    assert_eq!(parsed.subject(), Some("cross-check"));
    assert_eq!(parsed.message_id(), Some("rt6@board"));
    assert_eq!(parsed.body_text(0).unwrap().trim_end(), "just text");
    assert_eq!(parsed.attachment_count(), 1);
    assert_eq!(parsed.attachment(0).unwrap().contents(), &[0xff, 0, 1, 2, 3]);
}

#[test]
fn test_fresh_boundary_per_generation() {
    let (_dir, store) = store();
    let post = ingest(
        &store,
        b"Content-Type: multipart/mixed; boundary=fixed\n\n--fixed\n\nx\n--fixed--\n",
    );
    let a = generate(&store, &post);
    let b = generate(&store, &post);
    assert_ne!(a, b);
    assert!(!String::from_utf8_lossy(&a).contains("boundary=fixed"));
}
