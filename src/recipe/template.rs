// src/recipe/template.rs

//! Recipe file templates
//!
//! Templates use `%(name)s` placeholders; `%%` is a literal percent sign.
//! Lines starting with `#--` are template comments and are dropped from the
//! output. Referencing a variable that was not supplied is an error, so a
//! template and the code filling it cannot silently drift apart.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of template files in the template directory
pub const TEMPLATE_SUFFIX: &str = ".template";

/// Named substitution values
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    values: HashMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl ToString) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    pub fn set(&mut self, name: &str, value: impl ToString) {
        self.values.insert(name.to_string(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Renders named templates into files
pub trait TemplateRenderer {
    /// Render `<name>.template` with `vars`
    fn render(&self, name: &str, vars: &TemplateVars) -> Result<String>;

    /// Render `<name>.template` into `dest`
    fn render_to(&self, name: &str, dest: &Path, vars: &TemplateVars) -> Result<()> {
        let text = self.render(name, vars)?;
        fs::write(dest, text)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {e}", dest.display())))
    }
}

/// Reads templates from a directory
#[derive(Debug, Clone)]
pub struct DirTemplateRenderer {
    dir: PathBuf,
}

impl DirTemplateRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TemplateRenderer for DirTemplateRenderer {
    fn render(&self, name: &str, vars: &TemplateVars) -> Result<String> {
        let path = self.dir.join(format!("{name}{TEMPLATE_SUFFIX}"));
        let template = fs::read_to_string(&path).map_err(|e| {
            Error::TemplateError(format!("Failed to read {}: {e}", path.display()))
        })?;
        fill(&template, vars).map_err(|e| match e {
            Error::TemplateError(msg) => Error::TemplateError(format!("{}: {msg}", path.display())),
            other => other,
        })
    }
}

/// Substitute `%(name)s` placeholders and drop `#--` comment lines
pub fn fill(template: &str, vars: &TemplateVars) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('%') {
            out.push('%');
            rest = after;
        } else if let Some(inner) = tail.strip_prefix('(') {
            let close = inner
                .find(")s")
                .ok_or_else(|| Error::TemplateError("unterminated %(...)s placeholder".into()))?;
            let name = &inner[..close];
            let value = vars
                .get(name)
                .ok_or_else(|| Error::TemplateError(format!("no value for '{name}'")))?;
            out.push_str(value);
            rest = &inner[close + 2..];
        } else {
            out.push('%');
            rest = tail;
        }
    }
    out.push_str(rest);

    Ok(strip_template_comments(&out))
}

fn strip_template_comments(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !line.starts_with("#--"))
        .collect()
}

/// `\n    - a\n    - b` list fragment for `meta.yaml`, empty for no items
pub fn yaml_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("\n    - {}", item.as_ref()))
        .collect()
}
