use criterion::{criterion_group, criterion_main, Criterion};

use boardnews::generator::generate_message;
use boardnews::nntp::DotEncoder;
use boardnews::parser::ArticleProcessor;
use boardnews::store::{FileStore, NoThumbnailer};

/// A multipart article with a text part and a base64 attachment.
fn sample_article() -> Vec<u8> {
    let mut article = String::from(
        "Message-ID: <bench@board>\n\
Subject: benchmark\n\
MIME-Version: 1.0\n\
Content-Type: multipart/mixed; boundary=bench\n\
\n\
--bench\n\
Content-Type: text/plain; charset=UTF-8\n\
\n",
    );
    for i in 0..200 {
        article.push_str(&format!("line {i} of the inline message\n"));
    }
    article.push_str(
        "--bench\n\
Content-Type: application/octet-stream; name=\"blob.bin\"\n\
Content-Transfer-Encoding: base64\n\
\n",
    );
    for _ in 0..1000 {
        article.push_str("AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCUmJygpKissLS4v\n");
    }
    article.push_str("--bench--\n");
    article.into_bytes()
}

fn bench_decode(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let processor = ArticleProcessor::default();
    let article = sample_article();

    c.bench_function("devour_article", |b| {
        b.iter(|| {
            let mut input = article.as_slice();
            processor
                .devour_article(&store, &NoThumbnailer, &mut input)
                .unwrap()
                .pending_files()
        })
    });
}

fn bench_generate(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let article = sample_article();
    let mut input = article.as_slice();
    let post = ArticleProcessor::default()
        .devour_article(&store, &NoThumbnailer, &mut input)
        .unwrap()
        .commit(&store)
        .unwrap();

    c.bench_function("generate_message", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(128 * 1024);
            generate_message(&mut out, &post, &store).unwrap();
            out.len()
        })
    });
}

fn bench_dot_encode(c: &mut Criterion) {
    let article = sample_article();
    c.bench_function("dot_encode", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(article.len() * 2);
            let mut enc = DotEncoder::new();
            for chunk in article.chunks(32 * 1024) {
                enc.write(&mut out, chunk).unwrap();
            }
            enc.finish(&mut out).unwrap();
            out.len()
        })
    });
}

criterion_group!(benches, bench_decode, bench_generate, bench_dot_encode);
criterion_main!(benches);
