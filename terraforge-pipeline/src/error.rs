//! Pipeline-level error taxonomy.
//!
//! Per-spline and per-junction geometry failures are recovered where they
//! happen and only logged; everything that reaches this type terminates
//! the run. The CLI maps the variants onto exit codes.

use std::path::PathBuf;

use terraforge_mesh::MeshError;
use terraforge_roads::RoadError;
use terraforge_terrain::TerrainError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt input: {0}")]
    CorruptInput(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Validation(_) => 2,
            PipelineError::Io { .. } => 3,
            PipelineError::UnsupportedFormat(_) | PipelineError::CorruptInput(_) => 4,
            PipelineError::Cancelled => 1,
        }
    }
}

impl From<TerrainError> for PipelineError {
    fn from(err: TerrainError) -> Self {
        match err {
            TerrainError::UnsupportedFormat(v) => {
                PipelineError::UnsupportedFormat(format!("terrain version {v}"))
            }
            TerrainError::InvalidSize(n) => {
                PipelineError::Validation(format!("terrain size {n} is not supported"))
            }
            TerrainError::CorruptInput(msg) => PipelineError::CorruptInput(msg),
            TerrainError::LayerSizeMismatch { .. } => PipelineError::Validation(err.to_string()),
            TerrainError::Io(e) => PipelineError::Io {
                path: PathBuf::new(),
                source: e,
            },
            TerrainError::Image(e) => PipelineError::CorruptInput(e.to_string()),
        }
    }
}

impl From<RoadError> for PipelineError {
    fn from(err: RoadError) -> Self {
        PipelineError::Validation(err.to_string())
    }
}

impl From<MeshError> for PipelineError {
    fn from(err: MeshError) -> Self {
        match err {
            MeshError::Io(e) => PipelineError::Io {
                path: PathBuf::new(),
                source: e,
            },
            other => PipelineError::CorruptInput(other.to_string()),
        }
    }
}
