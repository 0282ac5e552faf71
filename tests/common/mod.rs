#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tower::ServiceExt;
use zip::{write::SimpleFileOptions, ZipWriter};

use rest_latex::{create_router, utils::config::AppConfig, AppState};

pub const BOUNDARY: &str = "----rest-latex-test-boundary";

/// Fake pdflatex-compatible engine.
///
/// argv: `-interaction=nonstopmode -halt-on-error -output-directory <dir> <main>`.
/// Records the workspace contents, fails on `\undefinedcommand`, sleeps on
/// `\hang`, otherwise writes a tiny PDF next to the main file.
const FAKE_ENGINE: &str = r#"#!/bin/sh
outdir="$4"
main="$5"
find . -type f | sort > "__LOG_DIR__/listing"
if grep -q 'undefinedcommand' "$main"; then
    echo "! Undefined control sequence."
    echo "l.3 \undefinedcommand" >&2
    exit 1
fi
if grep -q 'hang' "$main"; then
    sleep 30
fi
printf '%%PDF-1.4\n%% fake output\n%%%%EOF\n' > "$outdir/${main%.tex}.pdf"
"#;

/// Engine that claims success without producing anything.
const SILENT_ENGINE: &str = "#!/bin/sh\nexit 0\n";

pub struct TestApp {
    pub router: Router,
    pub root: TempDir,
}

impl TestApp {
    pub fn workspace_root(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.path().join("logs")
    }

    /// Workspace directories currently on disk
    pub fn workspaces(&self) -> Vec<PathBuf> {
        fs::read_dir(self.workspace_root())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    /// Files the fake engine saw in its working directory on the last run
    pub fn last_listing(&self) -> Option<Vec<String>> {
        fs::read_to_string(self.log_dir().join("listing"))
            .ok()
            .map(|text| text.lines().map(str::to_string).collect())
    }

    pub fn clear_listing(&self) {
        let _ = fs::remove_file(self.log_dir().join("listing"));
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// App wired to the fake engine script
pub fn setup_test_app(timeout_seconds: u64) -> TestApp {
    setup_with_engine(Some(FAKE_ENGINE), timeout_seconds)
}

/// App whose engine exits 0 and writes nothing
pub fn setup_silent_engine_app() -> TestApp {
    setup_with_engine(Some(SILENT_ENGINE), 10)
}

/// App configured with an engine that is not installed anywhere
pub fn setup_missing_engine_app() -> TestApp {
    setup_with_engine(None, 10)
}

/// App using the real engine (`tectonic` unless LATEX_ENGINE says otherwise)
pub fn setup_real_engine_app() -> TestApp {
    let root = TempDir::new().unwrap();
    let engine = std::env::var("LATEX_ENGINE").unwrap_or_else(|_| "tectonic".to_string());
    build_app(root, engine, 120)
}

fn setup_with_engine(script: Option<&str>, timeout_seconds: u64) -> TestApp {
    let root = TempDir::new().unwrap();
    let log_dir = root.path().join("logs");
    fs::create_dir_all(&log_dir).unwrap();

    let engine = match script {
        Some(script) => {
            let path = root.path().join("bin").join("fake-latex");
            write_script(&path, &script.replace("__LOG_DIR__", &log_dir.to_string_lossy()));
            path.to_string_lossy().into_owned()
        }
        None => root
            .path()
            .join("bin")
            .join("no-such-engine")
            .to_string_lossy()
            .into_owned(),
    };

    build_app(root, engine, timeout_seconds)
}

fn build_app(root: TempDir, engine: String, timeout_seconds: u64) -> TestApp {
    let config = AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        latex_engine: engine,
        latex_timeout_seconds: timeout_seconds,
        latex_main_filename: "main.tex".to_string(),
        tectonic_cache_dir: root.path().join("cache"),
        workspace_root: root.path().join("work"),
        max_upload_size: 10 * 1024 * 1024,      // 10MB
        max_extracted_size: 50 * 1024 * 1024, // 50MB
    };
    config.ensure_directories().unwrap();

    TestApp {
        router: create_router(AppState::new(config)),
        root,
    }
}

fn write_script(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// One multipart form part: field name, optional filename, bytes
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub data: &'a [u8],
}

pub fn tex_part<'a>(filename: &'a str, source: &'a str) -> Part<'a> {
    Part {
        name: "tex_file",
        filename: Some(filename),
        data: source.as_bytes(),
    }
}

pub fn archive_part(data: &[u8]) -> Part<'_> {
    Part {
        name: "assets_archive",
        filename: Some("assets.zip"),
        data,
    }
}

/// Build a `POST /compile` request carrying the given parts
pub fn compile_request(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        let disposition = match part.filename {
            Some(filename) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.name, filename
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .uri("/compile")
        .method("POST")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// In-memory ZIP with the given (name, contents) file entries
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub const MINIMAL_DOCUMENT: &str = "\\documentclass{article}\n\\begin{document}\nHello, world!\n\\end{document}\n";

pub const BROKEN_DOCUMENT: &str = "\\documentclass{article}\n\\begin{document}\n\\undefinedcommand\n\\end{document}\n";

pub const HANGING_DOCUMENT: &str = "\\documentclass{article}\n\\begin{document}\n\\hang\n\\end{document}\n";
