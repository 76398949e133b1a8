//! Declaration-time templating
//!
//! Topology files are rendered through Tera before KDL parsing. Output
//! placeholders use `${...}` and pass through untouched, and so does the
//! body of every `user-data` node.

use crate::error::{DeclarationError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// Template variables
pub type Variables = HashMap<String, serde_json::Value>;

/// Only environment variables with this prefix reach templates
pub const ENV_PREFIX: &str = "TIERFLOW_";

pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// Add `TIERFLOW_*` environment variables
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;
        for (key, value) in std::env::vars() {
            if key.starts_with(ENV_PREFIX) {
                debug!(key = %key, "Adding environment variable");
                self.context.insert(key, &serde_json::Value::String(value));
                count += 1;
            }
        }
        info!(env_var_count = count, "Added filtered environment variables");
    }

    /// Add `KEY=VALUE` lines from a `.env` file, without prefix filtering
    #[tracing::instrument(skip(self))]
    pub fn add_env_file_variables(&mut self, env_file_path: &Path) -> Result<()> {
        let content =
            std::fs::read_to_string(env_file_path).map_err(|e| DeclarationError::IoError {
                path: env_file_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut count = 0;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = strip_quotes(value.trim());
                self.context
                    .insert(key.trim(), &serde_json::Value::String(value.to_string()));
                count += 1;
            }
        }

        info!(
            env_file = %env_file_path.display(),
            variable_count = count,
            "Loaded variables from .env file"
        );
        Ok(())
    }

    pub fn render_str(&mut self, template: &str) -> Result<String> {
        let (masked, opaque) = mask_opaque_nodes(template);
        let rendered = self
            .tera
            .render_str(&masked, &self.context)
            .map_err(|e| DeclarationError::TemplateRenderError(extract_tera_error_detail(&e)))?;
        Ok(opaque.restore(rendered))
    }

    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| DeclarationError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        self.render_str(&content).map_err(|e| match e {
            DeclarationError::TemplateRenderError(message) => DeclarationError::TemplateError {
                file: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect `variables { ... }` blocks
///
/// Blocks are located with a regex so that `{{ ... }}` elsewhere in the
/// unrendered file cannot break parsing.
pub fn extract_variables(kdl_content: &str) -> Result<Variables> {
    let re = Regex::new(r"(?s)variables\s*\{(?P<content>.*?)\}")
        .map_err(|e| DeclarationError::InvalidConfig(format!("regex compile error: {}", e)))?;

    let mut all_vars = HashMap::new();
    for cap in re.captures_iter(kdl_content) {
        let Some(var_content) = cap.name("content") else {
            continue;
        };
        let wrapped = format!("extracted {{\n{}\n}}", var_content.as_str());
        let doc: kdl::KdlDocument = wrapped.parse().map_err(|e| {
            DeclarationError::InvalidConfig(format!("KDL parse error in variables block: {}", e))
        })?;

        if let Some(node) = doc.nodes().first()
            && let Some(children) = node.children()
        {
            for var_node in children.nodes() {
                if let Some(entry) = var_node.entries().first() {
                    all_vars.insert(
                        var_node.name().value().to_string(),
                        kdl_value_to_json(entry.value()),
                    );
                }
            }
        }
    }

    Ok(all_vars)
}

/// Node names whose arguments and children are bootstrap commands
const OPAQUE_NODES: [&str; 2] = ["user-data", "user_data"];

/// Node bodies cut out of a document before rendering
#[derive(Debug, Default)]
struct OpaqueBodies(Vec<String>);

impl OpaqueBodies {
    fn marker(index: usize) -> String {
        format!("__tierflow_opaque_{}__", index)
    }

    fn restore(&self, mut rendered: String) -> String {
        for (index, body) in self.0.iter().enumerate().rev() {
            rendered = rendered.replace(&Self::marker(index), body);
        }
        rendered
    }
}

/// Replace the body of each `user-data` node with a marker Tera leaves alone
fn mask_opaque_nodes(content: &str) -> (String, OpaqueBodies) {
    let mut masked = String::with_capacity(content.len());
    let mut bodies = OpaqueBodies::default();
    let mut cursor = 0;

    while let Some((name_end, body_end)) = next_opaque_node(content.as_bytes(), cursor) {
        masked.push_str(&content[cursor..name_end]);
        masked.push_str(&OpaqueBodies::marker(bodies.0.len()));
        bodies.0.push(content[name_end..body_end].to_string());
        cursor = body_end;
    }
    masked.push_str(&content[cursor..]);

    (masked, bodies)
}

/// Locate the next opaque node at or after `from`: (end of its name, end of its body)
fn next_opaque_node(bytes: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    let mut node_start = true;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' | b'{' | b'}' | b';' => {
                node_start = true;
                i += 1;
            }
            b' ' | b'\t' | b'\r' => i += 1,
            b'"' | b'#' => {
                node_start = false;
                i = skip_string(bytes, i).unwrap_or(i + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = line_end(bytes, i),
            _ => {
                if node_start
                    && let Some(name) = OPAQUE_NODES.iter().find(|n| {
                        bytes[i..].starts_with(n.as_bytes())
                            && !bytes.get(i + n.len()).is_some_and(|c| is_name_byte(*c))
                    })
                {
                    let name_end = i + name.len();
                    return Some((name_end, node_end(bytes, name_end)));
                }
                node_start = false;
                i += 1;
            }
        }
    }
    None
}

/// End of the node whose entries start at `from`, children block included
fn node_end(bytes: &[u8], from: usize) -> usize {
    let mut depth = 0usize;
    let mut i = from;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'#' => i = skip_string(bytes, i).unwrap_or(i + 1),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                if depth == 0 {
                    return i;
                }
                i = line_end(bytes, i);
            }
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            b'\n' | b';' if depth == 0 => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skip a quoted, multi-line or raw KDL string starting at `start`
fn skip_string(bytes: &[u8], start: usize) -> Option<usize> {
    let hashes = bytes[start..].iter().take_while(|b| **b == b'#').count();
    let open = start + hashes;
    if bytes.get(open) != Some(&b'"') {
        return None;
    }
    let triple = bytes[open..].starts_with(b"\"\"\"");
    let quote: &[u8] = if triple { b"\"\"\"" } else { b"\"" };
    let mut i = open + quote.len();

    while i < bytes.len() {
        if hashes == 0 && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(quote)
            && bytes[i + quote.len()..].iter().take_while(|b| **b == b'#').count() >= hashes
        {
            return Some(i + quote.len() + hashes);
        }
        i += 1;
    }
    Some(bytes.len())
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |p| from + p)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// "value" → value, 'value' → value
fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Flatten a Tera error chain, naming the undefined variable when there is one
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "undefined variable `{}`\nhint: define it in a variables block, a .env file or a {}* environment variable",
            var_name, ENV_PREFIX
        );
    }

    full_error
}

fn kdl_value_to_json(value: &kdl::KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(|i| serde_json::Value::Number(i.into()))
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}
