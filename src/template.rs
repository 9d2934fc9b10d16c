//! Minimal template rendering for file resources.
//!
//! Substitutes `{{ name }}` placeholders from a variable map. Anything
//! fancier belongs to an external renderer; the engine only needs
//! path + vars → string.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Render a template file with the given variable bindings.
pub fn render(template_path: &Path, vars: &BTreeMap<String, String>) -> Result<String> {
    let source = std::fs::read_to_string(template_path)
        .with_context(|| format!("template not found: {}", template_path.display()))?;
    Ok(render_str(&source, vars))
}

/// Render template source with the given variable bindings.
///
/// Both `{{name}}` and `{{ name }}` spellings are recognized. Unknown
/// placeholders are left in place.
pub fn render_str(source: &str, vars: &BTreeMap<String, String>) -> String {
    let mut rendered = source.to_string();
    for (name, value) in vars {
        rendered = rendered.replace(&format!("{{{{ {name} }}}}"), value);
        rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
    }
    rendered
}
