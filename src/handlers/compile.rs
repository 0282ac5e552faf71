use crate::models::compilation::{CompiledPdf, UploadedArchive, UploadedMainFile};
use crate::models::errors::AppError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::Response,
};
use futures_util::TryStreamExt;
use multer::{Constraints, Multipart, SizeLimit};
use tracing::Instrument;
use uuid::Uuid;

pub const TEX_FIELD: &str = "tex_file";
pub const ARCHIVE_FIELD: &str = "assets_archive";

/// Parsed `POST /compile` form.
#[derive(Debug)]
pub struct CompileUpload {
    pub main: UploadedMainFile,
    pub archive: Option<UploadedArchive>,
}

/// Compile an uploaded LaTeX document (plus optional asset ZIP) to PDF
pub async fn compile_document(
    State(app_state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("compile", %request_id);

    async move {
        let upload = read_upload(request, app_state.config.max_upload_size).await?;
        let pdf = app_state.compiler.compile(upload.main, upload.archive).await?;

        tracing::info!("Compiled {} ({} bytes)", pdf.filename, pdf.data.len());
        build_pdf_response(pdf)
    }
    .instrument(span)
    .await
}

/// Read the multipart body into memory, enforcing a per-field size limit
pub async fn read_upload(request: Request<Body>, max_field_size: usize) -> Result<CompileUpload, AppError> {
    let boundary = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| AppError::malformed_upload("Missing or invalid multipart boundary"))?;

    // Convert the request body to a stream
    let stream = request
        .into_body()
        .into_data_stream()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err));

    let constraints =
        Constraints::new().size_limit(SizeLimit::new().per_field(max_field_size as u64));
    let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

    let mut main = None;
    let mut archive = None;

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().map(|s| s.to_string()).unwrap_or_default();
        let filename = field.file_name().map(|s| s.to_string());

        tracing::debug!("Processing field: {} (filename: {:?})", name, filename);

        match name.as_str() {
            TEX_FIELD if main.is_none() => {
                let data = field.bytes().await.map_err(upload_error)?;
                main = Some(UploadedMainFile::new(filename, data.to_vec()));
            }
            // A file input left empty still submits a part with no file name.
            ARCHIVE_FIELD if archive.is_none() => match filename.filter(|f| !f.is_empty()) {
                Some(filename) => {
                    let data = field.bytes().await.map_err(upload_error)?;
                    archive = Some(UploadedArchive {
                        filename,
                        data: data.to_vec(),
                    });
                }
                None => tracing::debug!("Ignoring empty {} field", ARCHIVE_FIELD),
            },
            _ => tracing::debug!("Skipping field: {}", name),
        }
    }

    let main = main.ok_or_else(|| AppError::missing_field(TEX_FIELD))?;
    Ok(CompileUpload { main, archive })
}

fn upload_error(error: multer::Error) -> AppError {
    match error {
        multer::Error::FieldSizeExceeded { limit, field_name } => AppError::PayloadTooLarge {
            field: field_name.unwrap_or_default(),
            limit: limit as usize,
        },
        other => AppError::malformed_upload(other.to_string()),
    }
}

/// Package PDF bytes as a downloadable attachment
pub fn build_pdf_response(pdf: CompiledPdf) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime::APPLICATION_PDF.as_ref())
        .header(header::CONTENT_LENGTH, pdf.data.len().to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", pdf.filename),
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from(pdf.data))
        .map_err(|e| AppError::internal_error(format!("Failed to build PDF response: {}", e)))
}
