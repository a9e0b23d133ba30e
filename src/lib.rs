//! Compile declarative YAML statecharts into standalone state machine
//! source for C, Rust, or Python, plus a Graphviz rendering.
//!
//! Pipeline: parse ([`model`]) -> [`normalize`] -> [`validate`] ->
//! emit ([`emit`], [`dot`]). The emitters share one semantic core; the
//! per-language backends contribute surface syntax only.

pub mod dot;
pub mod emit;
pub mod error;
pub mod model;
pub mod normalize;
pub mod path;
pub mod validate;

pub use emit::{generate, Lang, OutputFile};
pub use error::CompileError;
pub use model::{Chart, Model};

/// Parse a model file's text into the raw model.
pub fn parse_model(source: &str) -> Result<Model, CompileError> {
    Ok(serde_yaml::from_str(source)?)
}

/// Parse, normalize, and validate in one step.
pub fn build_chart(source: &str) -> Result<Chart, CompileError> {
    let model = parse_model(source)?;
    let chart = normalize::normalize(model)?;
    validate::validate(&chart)?;
    Ok(chart)
}
