//! Request lifecycle: validate, stage, convert, hand back a streamable
//! result, and clean up.
//!
//! ```text
//! Received ──validate──▶ Staged ──permit──▶ Converting ──▶ Succeeded
//!     │                    │                    │
//!     └────────────────────┴────────────────────┴──────▶ Failed
//! ```
//!
//! Both temp files of a request live in one [`ArtifactGuard`]. The guard is
//! dropped exactly once: on any failure path before `convert` returns, or
//! when the [`ConvertedFile`] (or the stream made from it) goes away.

use crate::config::ServiceConfig;
use crate::converters::Converter;
use crate::error::{ConvertError, RequestError};
use crate::format::{Format, TargetSpec};
use crate::router::{self, Resolution, Route};
use futures::Stream;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Read size when streaming the converted file out.
const CHUNK_SIZE: usize = 64 * 1024;

static UNSAFE_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static pattern"));

/// An upload as received, before any validation.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Client-supplied file name; may include a path, which is ignored.
    pub file_name: String,
    pub data: Vec<u8>,
    /// Raw `target_format` value, e.g. `docx` or `pdf_to_docx`.
    pub target_format: String,
}

impl ConversionRequest {
    pub fn new(
        file_name: impl Into<String>,
        data: Vec<u8>,
        target_format: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            data,
            target_format: target_format.into(),
        }
    }
}

/// Where a request is in its lifecycle. Logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Staged,
    Converting,
    Succeeded,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestState::Received => "received",
            RequestState::Staged => "staged",
            RequestState::Converting => "converting",
            RequestState::Succeeded => "succeeded",
            RequestState::Failed => "failed",
        })
    }
}

/// A validated request: everything needed to stage and convert.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Plan {
    route: Route,
    stem: String,
}

/// Last path component of a client file name, whichever separator it uses.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim()
}

/// Safe stem for temp and download names: ASCII letters, digits, `.`, `_`, `-`.
pub fn sanitize_stem(file_name: &str) -> String {
    let base = base_name(file_name);
    let stem = Path::new(base)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned = UNSAFE_NAME_CHARS.replace_all(&stem, "_");
    let cleaned: String = cleaned.trim_matches(['.', '_']).chars().take(80).collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

// ── Artifacts ────────────────────────────────────────────────────────────

/// Owns the input and output temp files of one request.
///
/// `release` deletes whatever is still held; it runs from `Drop`, and the
/// `Option::take` on each slot makes a second call a no-op.
pub struct ArtifactGuard {
    request_id: Uuid,
    input_path: PathBuf,
    output_path: PathBuf,
    input: Option<TempPath>,
    output: Option<TempPath>,
}

impl ArtifactGuard {
    /// Write `data` to a fresh input file and reserve a fresh output file,
    /// both named `<stem>-<random>.<ext>` inside `work_dir`.
    fn stage(
        request_id: Uuid,
        work_dir: &Path,
        plan: &Plan,
        data: &[u8],
    ) -> Result<Self, RequestError> {
        let prefix = format!("{}-", plan.stem);

        let mut input = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&format!(".{}", plan.route.source.extension()))
            .tempfile_in(work_dir)
            .map_err(|e| RequestError::io("creating input file", e))?;
        input
            .write_all(data)
            .and_then(|()| input.flush())
            .map_err(|e| RequestError::io("writing upload", e))?;
        let input = input.into_temp_path();

        let output = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&format!(".{}", plan.route.target.extension()))
            .tempfile_in(work_dir)
            .map_err(|e| RequestError::io("creating output file", e))?
            .into_temp_path();

        Ok(Self {
            request_id,
            input_path: input.to_path_buf(),
            output_path: output.to_path_buf(),
            input: Some(input),
            output: Some(output),
        })
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Delete both files now. Failures are logged, never returned.
    pub fn release(&mut self) {
        for slot in [&mut self.input, &mut self.output] {
            let Some(temp) = slot.take() else { continue };
            let path = temp.to_path_buf();
            match temp.close() {
                Ok(()) => debug!(request_id = %self.request_id, "removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    request_id = %self.request_id,
                    error = %e,
                    "failed to remove temporary file {}",
                    path.display()
                ),
            }
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Result ───────────────────────────────────────────────────────────────

/// A successful conversion. Holds the temp files until it is dropped or its
/// stream finishes.
pub struct ConvertedFile {
    file_name: String,
    target: Format,
    len: u64,
    guard: ArtifactGuard,
}

impl ConvertedFile {
    /// Download name: `<sanitised stem>_converted.<ext>`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn target(&self) -> Format {
        self.target
    }

    pub fn mime(&self) -> &'static str {
        self.target.mime_type()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn input_path(&self) -> &Path {
        self.guard.input_path()
    }

    pub fn output_path(&self) -> &Path {
        self.guard.output_path()
    }

    /// Read the whole output, then clean up.
    pub async fn into_bytes(self) -> Result<Vec<u8>, RequestError> {
        tokio::fs::read(self.guard.output_path())
            .await
            .map_err(|e| RequestError::io("reading converted file", e))
    }

    /// Stream the output in chunks. The temp files are removed when the
    /// stream ends or is dropped, whichever comes first.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static {
        let ConvertedFile { guard, .. } = self;
        futures::stream::try_unfold((None, guard), |(file, guard)| next_chunk(file, guard))
    }
}

type ChunkState = (Option<tokio::fs::File>, ArtifactGuard);

async fn next_chunk(
    file: Option<tokio::fs::File>,
    guard: ArtifactGuard,
) -> std::io::Result<Option<(Vec<u8>, ChunkState)>> {
    let mut file = match file {
        Some(f) => f,
        None => tokio::fs::File::open(guard.output_path()).await?,
    };
    let mut buf = vec![0u8; CHUNK_SIZE];
    let n = file.read(&mut buf).await?;
    if n == 0 {
        debug!(request_id = %guard.request_id, "transfer complete");
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some((buf, (Some(file), guard))))
}

impl fmt::Debug for ConvertedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertedFile")
            .field("file_name", &self.file_name)
            .field("target", &self.target)
            .field("len", &self.len)
            .field("output_path", &self.guard.output_path)
            .finish()
    }
}

// ── Service ──────────────────────────────────────────────────────────────

/// Runs conversion requests against one working directory.
///
/// Cheap to share behind an `Arc`; all per-request state lives in the
/// `convert` call.
pub struct ConversionService {
    config: ServiceConfig,
    converter: Arc<dyn Converter>,
    permits: Arc<Semaphore>,
}

impl ConversionService {
    /// Create the service, creating the working directory if needed.
    pub fn new(config: ServiceConfig) -> Result<Self, RequestError> {
        std::fs::create_dir_all(&config.work_dir)
            .map_err(|e| RequestError::io("creating working directory", e))?;
        info!(
            work_dir = %config.work_dir.display(),
            max_upload_bytes = config.max_upload_bytes,
            max_concurrent = config.max_concurrent_conversions,
            "conversion service ready"
        );
        Ok(Self {
            converter: config.resolve_converter(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_conversions)),
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Check a request without touching the disk.
    fn plan(&self, request: &ConversionRequest) -> Result<Plan, RequestError> {
        let name = base_name(&request.file_name);
        if name.is_empty() {
            return Err(RequestError::InvalidInput("no file selected".into()));
        }
        if request.data.is_empty() {
            return Err(RequestError::InvalidInput("uploaded file is empty".into()));
        }
        if request.data.len() > self.config.max_upload_bytes {
            return Err(RequestError::PayloadTooLarge {
                limit: self.config.max_upload_bytes,
            });
        }
        let source = Format::from_file_name(name).map_err(|ext| match ext {
            None => RequestError::InvalidInput(format!("'{name}' has no file extension")),
            Some(ext) => {
                RequestError::InvalidInput(format!("unrecognised file extension '.{ext}'"))
            }
        })?;
        let spec = TargetSpec::parse(&request.target_format).map_err(RequestError::InvalidInput)?;
        if let Some(expected) = spec.expected_source {
            if expected != source {
                return Err(RequestError::InvalidInput(format!(
                    "conversion type expects a {expected} file but '{name}' is {source}"
                )));
            }
        }
        match router::resolve(source, spec.target) {
            Resolution::Converter(route) => Ok(Plan {
                route,
                stem: sanitize_stem(name),
            }),
            Resolution::Unsupported { source, target } => {
                Err(RequestError::UnsupportedConversion {
                    from: source,
                    to: target,
                })
            }
        }
    }

    /// Run one request to completion.
    ///
    /// On success the returned file still holds its temp files; on error
    /// they are already gone.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConvertedFile, RequestError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("conversion", %request_id);
        async move {
            info!(
                state = %RequestState::Received,
                file = %request.file_name,
                bytes = request.data.len(),
                target = %request.target_format,
                "request received"
            );
            let result = self.run(request_id, request).await;
            match &result {
                Ok(file) => info!(
                    state = %RequestState::Succeeded,
                    bytes = file.len(),
                    "conversion succeeded"
                ),
                Err(e) if e.is_client_error() => {
                    info!(state = %RequestState::Failed, error = %e, "request rejected")
                }
                Err(e) => error!(state = %RequestState::Failed, error = %e, "conversion failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: ConversionRequest,
    ) -> Result<ConvertedFile, RequestError> {
        let plan = self.plan(&request)?;
        let route = plan.route;

        let work_dir = self.config.work_dir.clone();
        let staging_plan = plan.clone();
        let guard = tokio::task::spawn_blocking(move || {
            ArtifactGuard::stage(request_id, &work_dir, &staging_plan, &request.data)
        })
        .await
        .map_err(|e| RequestError::Internal(format!("staging task failed: {e}")))??;
        debug!(
            state = %RequestState::Staged,
            input = %guard.input_path().display(),
            "upload staged"
        );

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| RequestError::Internal("conversion pool closed".into()))?;
        debug!(state = %RequestState::Converting, kind = ?route.kind, "converting");

        // Guard and permit live in the blocking task until the converter returns.
        let converter = Arc::clone(&self.converter);
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = converter.convert(route, guard.input_path(), guard.output_path());
            (guard, result)
        })
        .await;

        let guard = match outcome {
            Ok((guard, Ok(()))) => guard,
            Ok((_guard, Err(e))) => return Err(RequestError::Conversion(e)),
            Err(join) => {
                return Err(RequestError::Internal(if join.is_panic() {
                    "converter panicked".to_string()
                } else {
                    format!("converter task failed: {join}")
                }))
            }
        };

        let len = match tokio::fs::metadata(guard.output_path()).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            Ok(_) => return Err(ConvertError::EmptyOutput.into()),
            Err(e) => return Err(ConvertError::io(guard.output_path(), e).into()),
        };

        Ok(ConvertedFile {
            file_name: format!("{}_converted.{}", plan.stem, route.target.extension()),
            target: route.target,
            len,
            guard,
        })
    }
}
