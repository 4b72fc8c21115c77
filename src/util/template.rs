use std::fs;
use std::path::Path;

use crate::error::Result;

/// Renders a one-off tera template against a JSON context. Autoescape is off:
/// output is graph source text, not HTML.
pub fn render_template(template: &str, context: &serde_json::Value) -> Result<String> {
    let context = tera::Context::from_serialize(context)?;
    Ok(tera::Tera::one_off(template, &context, false)?)
}

pub fn load_template(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}
