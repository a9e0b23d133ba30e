use itertools::Itertools;
use thiserror::Error;

/// Structural findings collected across the whole model. Validation never
/// stops at the first problem; everything is reported in one batch.
#[derive(Debug, Error)]
#[error("model validation failed:\n{}", .errors.iter().map(|e| format!("  - {e}")).join("\n"))]
pub struct ValidationErrors {
    pub errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }

    pub fn single(error: impl Into<String>) -> Self {
        Self { errors: vec![error.into()] }
    }
}

/// Failure while emitting target code. The `State`/`Transition` wrappers
/// carry the location context down to the offending transition.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("error generating state '{path}': {source}")]
    State {
        path: String,
        #[source]
        source: Box<EmitError>,
    },
    #[error("transition #{index}: {source}")]
    Transition {
        index: usize,
        #[source]
        source: Box<EmitError>,
    },
    #[error("{0}")]
    Message(String),
}

impl EmitError {
    pub fn msg(message: impl Into<String>) -> Self {
        EmitError::Message(message.into())
    }

    pub fn in_state(self, path: impl Into<String>) -> Self {
        EmitError::State { path: path.into(), source: Box::new(self) }
    }

    pub fn in_transition(self, index: usize) -> Self {
        EmitError::Transition { index, source: Box::new(self) }
    }
}

/// Everything the compilation pipeline can fail with, parse through emission.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("YAML syntax error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Emit(#[from] EmitError),
}
