//! HTTP-level tests: drive the axum router in-process and check responses
//! and the working directory after every request.
//!
//! The PDF → PPTX test needs libpdfium; it prints SKIP and returns when the
//! library cannot be bound (set PDFIUM_LIB_PATH to run it).

use axum::body::Body;
use axum::http::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use docshift::converters::{docx, pdf, render, Block};
use docshift::{server, ConversionService, ConvertError, Converter, Format, Route, ServiceConfig};
use http_body_util::BodyExt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "docshift-test-boundary";

// ── Test helpers ─────────────────────────────────────────────────────────────

struct Harness {
    _root: TempDir,
    work_dir: PathBuf,
    service: Arc<ConversionService>,
}

impl Harness {
    fn new() -> Self {
        Self::with(|b| b)
    }

    fn with(
        configure: impl FnOnce(docshift::ServiceConfigBuilder) -> docshift::ServiceConfigBuilder,
    ) -> Self {
        let root = tempfile::tempdir().unwrap();
        let work_dir = root.path().join("work");
        let config = configure(ServiceConfig::builder().work_dir(&work_dir))
            .build()
            .unwrap();
        let service = Arc::new(ConversionService::new(config).unwrap());
        Self {
            _root: root,
            work_dir,
            service,
        }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        server::router(Arc::clone(&self.service))
            .oneshot(req)
            .await
            .unwrap()
    }

    fn leftovers(&self) -> Vec<String> {
        std::fs::read_dir(&self.work_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn assert_clean(&self) {
        let left = self.leftovers();
        assert!(left.is_empty(), "working directory not empty: {left:?}");
    }
}

fn multipart(file: Option<(&str, &[u8])>, target: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((name, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(target) = target {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"target_format\"\r\n\r\n{target}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn convert_request(file: Option<(&str, &[u8])>, target: Option<&str>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(multipart(file, target)))
        .unwrap()
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn error_message(resp: Response) -> String {
    let body = body_bytes(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    json["error"].as_str().unwrap().to_string()
}

fn header<'a>(resp: &'a Response, name: axum::http::HeaderName) -> &'a str {
    resp.headers().get(name).unwrap().to_str().unwrap()
}

fn sample_pdf(lines: &[&str]) -> Vec<u8> {
    let blocks: Vec<Block> = lines.iter().map(|l| Block::Paragraph(l.to_string())).collect();
    pdf::blocks_to_pdf(&blocks).unwrap()
}

fn sample_jpeg() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(32, 24, image::Rgb([30, 120, 200]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}

// ── Successful conversions ───────────────────────────────────────────────────

#[tokio::test]
async fn text_to_pdf_returns_attachment_and_cleans_up() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("notes.txt", b"hello world")), Some("pdf")))
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, CONTENT_TYPE), "application/pdf");
    assert_eq!(
        header(&resp, CONTENT_DISPOSITION),
        "attachment; filename=\"notes_converted.pdf\""
    );
    let declared: usize = header(&resp, CONTENT_LENGTH).parse().unwrap();

    let body = body_bytes(resp).await;
    assert!(body.starts_with(b"%PDF"));
    assert_eq!(body.len(), declared);
    h.assert_clean();
}

#[tokio::test]
async fn pdf_to_docx_keeps_the_text() {
    let h = Harness::new();
    let input = sample_pdf(&["Quarterly report", "Revenue grew"]);
    let resp = h
        .send(convert_request(Some(("report.pdf", &input)), Some("docx")))
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        header(&resp, CONTENT_DISPOSITION),
        "attachment; filename=\"report_converted.docx\""
    );
    let body = body_bytes(resp).await;
    assert!(body.starts_with(b"PK"));
    h.assert_clean();

    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("out.docx");
    std::fs::write(&path, &body).unwrap();
    let text: Vec<String> = docx::read_blocks(&path)
        .unwrap()
        .into_iter()
        .filter_map(|b| match b {
            Block::Paragraph(t) | Block::Heading(t) => Some(t),
            Block::PageBreak => None,
        })
        .collect();
    let joined = text.join("\n");
    assert!(joined.contains("Quarterly report"), "got: {joined:?}");
    assert!(joined.contains("Revenue grew"), "got: {joined:?}");
}

#[tokio::test]
async fn legacy_conversion_type_is_accepted() {
    let h = Harness::new();
    let input = sample_pdf(&["legacy"]);
    let resp = h
        .send(convert_request(Some(("a.pdf", &input)), Some("pdf_to_txt")))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(body.contains("legacy"));
    h.assert_clean();
}

#[tokio::test]
async fn jpeg_to_pdf() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("Photo.JPG", &sample_jpeg())), Some("pdf")))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        header(&resp, CONTENT_DISPOSITION),
        "attachment; filename=\"Photo_converted.pdf\""
    );
    let body = body_bytes(resp).await;
    assert!(body.starts_with(b"%PDF"));
    h.assert_clean();
}

#[tokio::test]
async fn jpeg_to_png_uses_canonical_extension() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("photo.jpeg", &sample_jpeg())), Some("png")))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, CONTENT_TYPE), "image/png");
    let body = body_bytes(resp).await;
    let img = image::load_from_memory(&body).unwrap();
    assert_eq!((img.width(), img.height()), (32, 24));
    h.assert_clean();
}

#[tokio::test]
async fn csv_to_xlsx_is_readable_as_a_workbook() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(
            Some(("prices.csv", b"item,price\ntea,4.5\n")),
            Some("xlsx"),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    h.assert_clean();

    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("prices.xlsx");
    std::fs::write(&path, &body).unwrap();
    let table = docshift::converters::sheet::read(&path, Format::Xlsx).unwrap();
    assert_eq!(table.rows, vec![vec!["item", "price"], vec!["tea", "4.5"]]);
}

fn xls_fixture() -> Vec<u8> {
    std::fs::read(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/prices.xls")).unwrap()
}

#[tokio::test]
async fn xls_to_csv_renders_dates() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("prices.xls", &xls_fixture())), Some("csv")))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header(&resp, CONTENT_TYPE).starts_with("text/csv"));
    let body = String::from_utf8(body_bytes(resp).await).unwrap();
    assert_eq!(
        body,
        "item,price,sold\ntea,4.5,2023-07-16\ncake,12,2023-07-17 12:00:00\n"
    );
    h.assert_clean();
}

#[tokio::test]
async fn xls_to_xlsx_keeps_every_cell() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("prices.xls", &xls_fixture())), Some("xlsx")))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert!(body.starts_with(b"PK"));
    h.assert_clean();

    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("prices.xlsx");
    std::fs::write(&path, &body).unwrap();
    let table = docshift::converters::sheet::read(&path, Format::Xlsx).unwrap();
    assert_eq!(
        table.rows,
        vec![
            vec!["item", "price", "sold"],
            vec!["tea", "4.5", "2023-07-16"],
            vec!["cake", "12", "2023-07-17 12:00:00"],
        ]
    );
}

#[tokio::test]
async fn pdf_to_pptx_when_pdfium_is_available() {
    let lib = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
    if let Err(e) = render::bind(lib.as_deref()) {
        println!("SKIP: pdfium not available: {e}");
        return;
    }
    let h = Harness::with(|b| match &lib {
        Some(p) => b.pdfium_library(p).render_width(400),
        None => b.render_width(400),
    });
    let input = pdf::blocks_to_pdf(&[
        Block::Paragraph("one".into()),
        Block::PageBreak,
        Block::Paragraph("two".into()),
    ])
    .unwrap();
    let resp = h
        .send(convert_request(Some(("deck.pdf", &input)), Some("pptx")))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert!(body.starts_with(b"PK"));
    h.assert_clean();

    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("deck.pptx");
    std::fs::write(&path, &body).unwrap();
    let slides = docshift::converters::pptx::read_slides(&path).unwrap();
    assert_eq!(slides.len(), 2);
}

// ── Rejections ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn file_without_extension_is_rejected_before_staging() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("README", b"text")), Some("pdf")))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(resp).await.contains("extension"));
    h.assert_clean();
}

#[tokio::test]
async fn unsupported_pair_is_400_and_names_both_formats() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("data.csv", b"a,b\n")), Some("pdf")))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let msg = error_message(resp).await;
    assert!(msg.contains("csv") && msg.contains("pdf"), "got: {msg}");
    h.assert_clean();
}

#[tokio::test]
async fn missing_parts_are_rejected() {
    let h = Harness::new();

    let resp = h.send(convert_request(None, Some("pdf"))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(resp).await.contains("no file"));

    let resp = h.send(convert_request(Some(("a.txt", b"x")), None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(error_message(resp).await.contains("target_format"));

    let resp = h.send(convert_request(Some(("", b"x")), Some("pdf"))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h.send(convert_request(Some(("a.txt", b"")), Some("pdf"))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    h.assert_clean();
}

#[tokio::test]
async fn mismatched_legacy_form_is_invalid_input() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("a.txt", b"x")), Some("pdf_to_docx")))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    h.assert_clean();
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let h = Harness::with(|b| b.max_upload_bytes(1024));
    let big = vec![b'a'; 4096];
    let resp = h
        .send(convert_request(Some(("big.txt", &big)), Some("pdf")))
        .await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    h.assert_clean();
}

#[tokio::test]
async fn non_multipart_body_is_400_json() {
    let h = Harness::new();
    let req = Request::builder()
        .method("POST")
        .uri("/convert")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!error_message(resp).await.is_empty());
}

#[tokio::test]
async fn browsers_get_an_html_error_page() {
    let h = Harness::new();
    let mut req = convert_request(Some(("README", b"x")), Some("pdf"));
    req.headers_mut()
        .insert(ACCEPT, "text/html,application/xhtml+xml".parse().unwrap());
    let resp = h.send(req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(header(&resp, CONTENT_TYPE).starts_with("text/html"));
    let body = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(body.starts_with("<h3>"));
    assert!(body.ends_with("<a href='/'>Go Back</a>"));
}

#[tokio::test]
async fn corrupt_input_is_a_500_with_detail() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("fake.pdf", b"not really")), Some("docx")))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(resp).await.contains("not a valid PDF"));
    h.assert_clean();
}

// ── Faulty converters ────────────────────────────────────────────────────────

struct Failing;

impl Converter for Failing {
    fn convert(&self, _route: Route, _input: &Path, output: &Path) -> Result<(), ConvertError> {
        std::fs::write(output, b"half-written").unwrap();
        Err(ConvertError::Pdf("synthetic failure".into()))
    }
}

struct Panicking;

impl Converter for Panicking {
    fn convert(&self, _route: Route, _input: &Path, output: &Path) -> Result<(), ConvertError> {
        std::fs::write(output, b"half-written").unwrap();
        panic!("converter blew up");
    }
}

struct Silent;

impl Converter for Silent {
    fn convert(&self, _route: Route, _input: &Path, _output: &Path) -> Result<(), ConvertError> {
        Ok(())
    }
}

#[tokio::test]
async fn failing_converter_leaves_nothing_behind() {
    let h = Harness::with(|b| b.converter(Arc::new(Failing)));
    let resp = h
        .send(convert_request(Some(("a.txt", b"x")), Some("pdf")))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(resp).await.contains("synthetic failure"));
    h.assert_clean();
}

#[tokio::test]
async fn panicking_converter_is_contained() {
    let h = Harness::with(|b| b.converter(Arc::new(Panicking)));
    let resp = h
        .send(convert_request(Some(("a.txt", b"x")), Some("pdf")))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let msg = error_message(resp).await;
    assert!(!msg.contains("blew up"), "panic detail leaked: {msg}");
    h.assert_clean();

    // The service keeps working afterwards.
    let resp = h
        .send(convert_request(Some(("a.txt", b"x")), Some("pdf")))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    h.assert_clean();
}

#[tokio::test]
async fn converter_that_writes_nothing_is_a_failure() {
    let h = Harness::with(|b| b.converter(Arc::new(Silent)));
    let resp = h
        .send(convert_request(Some(("a.txt", b"x")), Some("pdf")))
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(error_message(resp).await.contains("no output"));
    h.assert_clean();
}

// ── Lifecycle under load and abort ───────────────────────────────────────────

#[tokio::test]
async fn dropped_response_body_still_cleans_up() {
    let h = Harness::new();
    let resp = h
        .send(convert_request(Some(("a.txt", b"hello")), Some("docx")))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(h.leftovers().len(), 2, "artifacts live until the body is done");
    drop(resp);
    h.assert_clean();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_with_the_same_name_do_not_collide() {
    let h = Harness::with(|b| b.max_concurrent_conversions(2));
    let requests = (0..8).map(|i| {
        let text = format!("document number {i}");
        let router = server::router(Arc::clone(&h.service));
        async move {
            let resp = router
                .oneshot(convert_request(Some(("same.txt", text.as_bytes())), Some("docx")))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            body_bytes(resp).await
        }
    });
    let bodies = futures::future::join_all(requests).await;

    let scratch = tempfile::tempdir().unwrap();
    for (i, body) in bodies.iter().enumerate() {
        let path = scratch.path().join(format!("{i}.docx"));
        std::fs::write(&path, body).unwrap();
        let blocks = docx::read_blocks(&path).unwrap();
        assert_eq!(blocks, vec![Block::Paragraph(format!("document number {i}"))]);
    }
    h.assert_clean();
}

// ── Read-only endpoints ──────────────────────────────────────────────────────

#[tokio::test]
async fn formats_health_and_index() {
    let h = Harness::new();

    let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let resp = h.send(get("/formats")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let table: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let pdf_targets: Vec<&str> = table["pdf"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(pdf_targets, vec!["docx", "pptx", "txt"]);
    assert!(table.get("mp3").is_none());

    let resp = h.send(get("/health")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health["status"], "ok");

    let resp = h.send(get("/")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(html.contains("enctype=\"multipart/form-data\""));
    assert!(html.contains("name=\"target_format\""));
}
