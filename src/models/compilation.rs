use std::path::Path;

use crate::models::errors::AppError;

/// The entry-point LaTeX source as uploaded by the client.
#[derive(Debug, Clone)]
pub struct UploadedMainFile {
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedMainFile {
    pub fn new(filename: Option<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename,
            data: data.into(),
        }
    }

    /// Check the client-supplied name ends in `.tex`, ignoring case
    pub fn validate(&self) -> Result<(), AppError> {
        match self.filename.as_deref() {
            Some(name) if has_tex_extension(name) => Ok(()),
            Some(name) => Err(AppError::invalid_main_file(name)),
            None => Err(AppError::invalid_main_file("<no filename>")),
        }
    }
}

/// Optional ZIP of supporting files (images, bibliographies, class files).
#[derive(Debug, Clone)]
pub struct UploadedArchive {
    pub filename: String,
    pub data: Vec<u8>,
}

/// PDF bytes read out of a workspace before it is destroyed.
#[derive(Debug, Clone)]
pub struct CompiledPdf {
    pub filename: String,
    pub data: Vec<u8>,
}

impl CompiledPdf {
    pub async fn read_from(path: &Path) -> Result<Self, AppError> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::internal_error("PDF path has no file name"))?;

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::internal_error(format!("Failed to read PDF: {}", e)))?;

        Ok(Self { filename, data })
    }
}

/// Command-line flavour of the configured engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Tectonic,
    /// pdflatex, xelatex, lualatex and anything else accepting the same flags.
    PdfLatexCompatible,
}

impl EngineKind {
    pub fn from_engine_name(engine: &str) -> Self {
        if engine.eq_ignore_ascii_case("tectonic") {
            EngineKind::Tectonic
        } else {
            EngineKind::PdfLatexCompatible
        }
    }
}

pub fn has_tex_extension(filename: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".tex")
}
