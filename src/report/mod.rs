//! Report rendering hand-off.

pub mod renderer;

pub use renderer::{generate_json_bundle, JsonFileRenderer, ReportRenderer};
