// Argument Templates
// Renders `{placeholder}` engine arguments for one invocation

use std::collections::HashMap;
use thiserror::Error;

/// Placeholders an engine argument may reference
pub const PLACEHOLDERS: &[&str] = &[
    "distance",
    "double_planes",
    "energy",
    "relative_energy",
    "neutrons",
    "physics",
    "scenario",
    "physics_list",
    "events",
    "input",
    "simulation",
    "parameters",
    "digitization",
    "calibration",
    "calibration_table",
    "calibration_plot",
    "training",
    "reconstruction",
    "log",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("unterminated placeholder in '{0}'")]
    Unterminated(String),
}

/// Names referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Result<Vec<&str>, TemplateError> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
        names.push(&after[..end]);
        rest = &after[end + 1..];
    }
    Ok(names)
}

/// Check a template against the known placeholder set
pub fn validate(template: &str) -> Result<(), TemplateError> {
    for name in placeholders(template)? {
        if !PLACEHOLDERS.contains(&name) {
            return Err(TemplateError::UnknownPlaceholder(name.to_string()));
        }
    }
    Ok(())
}

/// Substitute every placeholder from `values`
pub fn render(template: &str, values: &HashMap<&str, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
        let name = &after[..end];
        let value = values
            .get(name)
            .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
