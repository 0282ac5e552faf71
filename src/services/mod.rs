// Compilation pipeline: workspace, archive sanitizer, engine, orchestration

pub mod archive;
pub mod compiler;
pub mod engine;
pub mod workspace;
