use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gm_core::UrlPattern;
use url::Url;

const PATTERNS: &[&str] = &[
    "http://*/*",
    "https://*.google.com/foo*bar",
    "*://example.com:8080/a/*/b*",
    "file:///home/*",
    "<all_urls>",
];

const URLS: &[&str] = &[
    "http://monkey.images.google.com/foooobar",
    "https://www.google.com/foo/baz/bar?q=1",
    "http://example.com:8080/a/x/y/b.html",
    "file:///home/user/index.html",
    "https://yahoo.com/",
];

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_patterns", |b| {
        b.iter(|| {
            for pattern in PATTERNS {
                black_box(UrlPattern::parse(black_box(pattern)).ok());
            }
        })
    });
}

fn bench_match(c: &mut Criterion) {
    let patterns: Vec<UrlPattern> = PATTERNS
        .iter()
        .map(|p| UrlPattern::parse(p).expect("bench pattern"))
        .collect();
    let urls: Vec<Url> = URLS
        .iter()
        .map(|u| Url::parse(u).expect("bench url"))
        .collect();

    c.bench_function("match_grid", |b| {
        b.iter(|| {
            let mut hits = 0usize;
            for pattern in &patterns {
                for url in &urls {
                    if pattern.matches(black_box(url)) {
                        hits += 1;
                    }
                }
            }
            hits
        })
    });
}

criterion_group!(benches, bench_parse, bench_match);
criterion_main!(benches);
