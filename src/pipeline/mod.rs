//! Per-request document pipeline: stage, extract, structure, tag, persist.

mod service;
pub mod types;

pub use service::{PipelineApi, PipelineService};
pub use types::{
    BatchResult, CompletedBatch, FILE_NAME_KEY, FileError, PipelineError, StructuredRecord,
    UploadedFile,
};
