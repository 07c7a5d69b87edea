//! Request parsing benchmarks
//!
//! Measures the incremental request parser, header folding, query decoding
//! and SSI template expansion.
//!
//! Run with: cargo bench --bench parser_performance

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use embedhttpd::http::query::Params;
use embedhttpd::http::template;
use embedhttpd::http::{HeaderMap, RequestParser};
use std::time::Duration;

const SIMPLE_GET: &[u8] = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";

const BROWSER_GET: &[u8] = b"GET /app/dashboard?tab=stats&range=7d HTTP/1.1\r\n\
Host: device.local\r\n\
User-Agent: Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/118.0\r\n\
Accept: text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8\r\n\
Accept-Language: en-US,en;q=0.5\r\n\
Accept-Encoding: gzip, deflate\r\n\
Connection: keep-alive\r\n\
Cookie: session=abcdef0123456789; theme=dark\r\n\
Cache-Control: max-age=0\r\n\r\n";

// ========== Request Parsing ==========

fn bench_parse_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_request");

    for (name, raw) in [("simple_get", SIMPLE_GET), ("browser_get", BROWSER_GET)] {
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("whole", name), raw, |b, raw| {
            b.iter(|| {
                let mut parser = RequestParser::new();
                black_box(parser.parse(black_box(raw)).unwrap());
            });
        });
    }

    group.bench_function("byte_at_a_time", |b| {
        b.iter(|| {
            let mut parser = RequestParser::new();
            let mut parsed = None;
            for chunk in BROWSER_GET.chunks(1) {
                if let Some(request) = parser.parse(chunk).unwrap() {
                    parsed = Some(request);
                }
            }
            black_box(parsed);
        });
    });

    group.finish();
}

fn bench_parse_post(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_post");

    for size in [64usize, 4096, 65536] {
        let body = "k=v&".repeat(size / 4);
        let raw = format!(
            "POST /form HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );

        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), raw.as_bytes(), |b, raw| {
            b.iter(|| {
                let mut parser = RequestParser::new();
                let request = parser.parse(black_box(raw)).unwrap().unwrap();
                black_box(request.body_params().len());
            });
        });
    }

    group.finish();
}

// ========== Headers and Parameters ==========

fn bench_header_lookup(c: &mut Criterion) {
    let mut headers = HeaderMap::new();
    for i in 0..20 {
        headers.set(format!("X-Header-{}", i), "value");
    }
    headers.set("Connection", "keep-alive, Upgrade");

    c.bench_function("header_has_token", |b| {
        b.iter(|| black_box(headers.has_token(black_box("connection"), black_box("upgrade"))));
    });
}

fn bench_query_decode(c: &mut Criterion) {
    let query = "name=two%20words&city=S%C3%A3o+Paulo&empty=&flag&n=42";

    c.bench_function("query_decode", |b| {
        b.iter(|| black_box(Params::parse(black_box(query))));
    });
}

// ========== Templates ==========

fn bench_template(c: &mut Criterion) {
    let mut group = c.benchmark_group("template");

    let page = "<tr><td>temp</td><td><!--#echo var=\"temp\" --></td></tr>\n".repeat(100);
    group.throughput(Throughput::Bytes(page.len() as u64));
    group.bench_function("render_100_directives", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(page.len());
            template::render(page.as_bytes(), &mut out, |_| Some("21.5".to_string())).unwrap();
            black_box(out);
        });
    });

    let plain = "<p>no directives here</p>\n".repeat(400);
    group.throughput(Throughput::Bytes(plain.len() as u64));
    group.bench_function("render_plain", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(plain.len());
            template::render(plain.as_bytes(), &mut out, |_| None).unwrap();
            black_box(out);
        });
    });

    group.finish();
}

criterion_group! {
    name = parsing;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(500);
    targets =
        bench_parse_request,
        bench_parse_post
}

criterion_group!(lookups, bench_header_lookup, bench_query_decode);
criterion_group!(templates, bench_template);

criterion_main!(parsing, lookups, templates);
