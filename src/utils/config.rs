use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Grace period added on top of the compile timeout for the whole request.
const REQUEST_GRACE_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Engine executable; also selects the command-line flavour.
    pub latex_engine: String,
    pub latex_timeout_seconds: u64,
    /// Name the uploaded main file is written under inside each workspace.
    pub latex_main_filename: String,
    pub tectonic_cache_dir: PathBuf,
    /// Parent directory of per-request workspaces.
    pub workspace_root: PathBuf,
    pub max_upload_size: usize,
    pub max_extracted_size: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            latex_engine: "tectonic".to_string(),
            latex_timeout_seconds: 60,
            latex_main_filename: "main.tex".to_string(),
            tectonic_cache_dir: PathBuf::from("/tmp/tectonic-cache"),
            workspace_root: env::temp_dir(),
            max_upload_size: 50 * 1024 * 1024,      // 50MB
            max_extracted_size: 512 * 1024 * 1024, // 512MB
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Some(port) = parse_var::<u16>("PORT") {
            config.port = port;
        }

        if let Ok(engine) = env::var("LATEX_ENGINE") {
            if !engine.trim().is_empty() {
                config.latex_engine = engine.trim().to_string();
            }
        }

        if let Some(timeout) = parse_var::<u64>("LATEX_TIMEOUT_SECONDS") {
            config.latex_timeout_seconds = timeout;
        }

        if let Ok(main_filename) = env::var("LATEX_MAIN_FILENAME") {
            if is_bare_filename(&main_filename) {
                config.latex_main_filename = main_filename;
            } else {
                tracing::warn!(
                    "Ignoring LATEX_MAIN_FILENAME={:?}: must be a plain file name",
                    main_filename
                );
            }
        }

        if let Ok(cache_dir) = env::var("TECTONIC_CACHE_DIR") {
            config.tectonic_cache_dir = PathBuf::from(cache_dir);
        }

        if let Ok(root) = env::var("WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(root);
        }

        if let Some(size) = parse_var::<usize>("MAX_UPLOAD_SIZE") {
            config.max_upload_size = size;
        }

        if let Some(size) = parse_var::<u64>("MAX_EXTRACTED_SIZE") {
            config.max_extracted_size = size;
        }

        config
    }

    /// Create the engine cache and workspace root if they are missing.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.tectonic_cache_dir)?;
        fs::create_dir_all(&self.workspace_root)?;
        Ok(())
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.latex_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.latex_timeout_seconds + REQUEST_GRACE_SECONDS)
    }

    /// File name the engine is expected to produce for the main file.
    pub fn pdf_filename(&self) -> String {
        Path::new(&self.latex_main_filename)
            .with_extension("pdf")
            .to_string_lossy()
            .into_owned()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

fn is_bare_filename(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path.file_name().map_or(false, |file_name| file_name == path.as_os_str())
}
