use std::sync::Arc;

use uuid::Uuid;

use crate::models::{
    compilation::{CompiledPdf, UploadedArchive, UploadedMainFile},
    errors::AppError,
};
use crate::services::{archive::ArchiveSanitizer, engine::EngineInvoker, workspace::Workspace};
use crate::utils::config::AppConfig;

/// Drives one compile request from upload to PDF bytes.
///
/// Every request gets its own [`Workspace`]; it is released on every path
/// out of [`LatexCompiler::compile`], after the engine's process group has
/// been killed and reaped.
#[derive(Debug, Clone)]
pub struct LatexCompiler {
    config: Arc<AppConfig>,
    engine: EngineInvoker,
    sanitizer: ArchiveSanitizer,
}

impl LatexCompiler {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            engine: EngineInvoker::from_config(&config),
            sanitizer: ArchiveSanitizer::new(config.max_extracted_size),
            config,
        }
    }

    pub async fn compile(
        &self,
        main: UploadedMainFile,
        archive: Option<UploadedArchive>,
    ) -> Result<CompiledPdf, AppError> {
        // Reject bad names before anything touches the disk.
        main.validate()?;

        let workspace = Workspace::create(&self.config.workspace_root)?;
        let result = self.compile_in(&workspace, main, archive).await;
        workspace.destroy();
        result
    }

    async fn compile_in(
        &self,
        workspace: &Workspace,
        main: UploadedMainFile,
        archive: Option<UploadedArchive>,
    ) -> Result<CompiledPdf, AppError> {
        let main_path = workspace
            .write_file(&self.config.latex_main_filename, &main.data)
            .await?;
        tracing::debug!(
            "Wrote {} ({} bytes) as {}",
            main.filename.as_deref().unwrap_or_default(),
            main.data.len(),
            main_path.display()
        );

        if let Some(archive) = archive {
            self.unpack_assets(workspace, archive).await?;
        }

        let argv = self
            .engine
            .build_command(workspace.path(), &self.config.latex_main_filename);
        let output = self.engine.invoke(&argv, workspace.path()).await?;
        tracing::info!("LaTeX engine succeeded in {:?}", output.elapsed);

        // Exit status 0 is not trusted on its own.
        let pdf_path = main_path.with_extension("pdf");
        if !tokio::fs::try_exists(&pdf_path).await.unwrap_or(false) {
            return Err(AppError::pdf_missing(pdf_path.display().to_string()));
        }

        CompiledPdf::read_from(&pdf_path).await
    }

    async fn unpack_assets(&self, workspace: &Workspace, archive: UploadedArchive) -> Result<(), AppError> {
        let stored_name = format!("assets-{}.zip", Uuid::new_v4().simple());
        let archive_path = workspace.write_file(&stored_name, &archive.data).await?;
        tracing::debug!(
            "Stored archive {} ({} bytes) as {}",
            archive.filename,
            archive.data.len(),
            stored_name
        );

        let sanitizer = self.sanitizer.clone();
        let target = workspace.path().to_path_buf();
        let filename = archive.filename;

        tokio::task::spawn_blocking(move || {
            if !ArchiveSanitizer::is_valid_archive(&archive_path) {
                return Err(AppError::invalid_archive(filename));
            }
            sanitizer.extract_safely(&archive_path, &target)
        })
        .await
        .map_err(|e| AppError::internal_error(format!("Archive extraction task failed: {}", e)))??;

        Ok(())
    }
}
