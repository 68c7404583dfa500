//! Minimal templating engines and recipes.
//!
//! Just enough of a reporting server to exercise a client: `none` passes the
//! content through, `jsrender` substitutes `{{:path}}` and checks
//! `{{:~helper()}}` calls against the declared helpers, and `handlebars`
//! substitutes `{{path}}`. Helpers are never executed; a declared helper
//! renders as an empty string. Recipes wrap the result in a plausible
//! document (real HTML/text, a stub PDF, a stub xlsx or its preview page).

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};

pub const ENGINES: &[&str] = &["none", "jsrender", "handlebars"];
pub const RECIPES: &[&str] = &["html", "text", "phantom-pdf", "chrome-pdf", "html-to-xlsx"];

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A template kept on the server and addressed by short id or name.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StoredTemplate {
    pub shortid: String,
    pub name: String,
    pub content: String,
    pub engine: String,
    pub recipe: String,
    #[serde(default)]
    pub helpers: Option<String>,
}

/// Successful render output.
#[derive(Debug)]
pub struct Rendered {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
}

/// Render failure, sent back as `{"message": ..., "stack": ...}`.
#[derive(Debug, PartialEq)]
pub struct RenderFailure {
    pub status: StatusCode,
    pub message: String,
}

impl RenderFailure {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

/// Render a request document against the given template store.
pub fn render(request: &Value, store: &[StoredTemplate]) -> Result<Rendered, RenderFailure> {
    let template = request
        .get("template")
        .and_then(Value::as_object)
        .ok_or_else(|| RenderFailure::bad_request("template property must be provided"))?;
    let template = resolve_template(template, store)?;

    let empty = Value::Object(Map::new());
    let data = request.get("data").unwrap_or(&empty);
    let preview = request
        .pointer("/options/preview")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let content = evaluate(&template, data)?;
    apply_recipe(&template.recipe, content, preview)
}

fn resolve_template(
    template: &Map<String, Value>,
    store: &[StoredTemplate],
) -> Result<StoredTemplate, RenderFailure> {
    let field = |key: &str| template.get(key).and_then(Value::as_str).map(str::to_string);

    if let Some(shortid) = field("shortid") {
        return store
            .iter()
            .find(|t| t.shortid == shortid)
            .cloned()
            .ok_or_else(|| {
                RenderFailure::not_found(format!(
                    "Unable to find specified template ({shortid})"
                ))
            });
    }
    if let Some(name) = field("name") {
        return store
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| {
                RenderFailure::not_found(format!("Unable to find specified template ({name})"))
            });
    }

    Ok(StoredTemplate {
        shortid: String::new(),
        name: "anonymous".to_string(),
        content: field("content").unwrap_or_default(),
        engine: field("engine")
            .ok_or_else(|| RenderFailure::bad_request("Engine must be specified"))?,
        recipe: field("recipe")
            .ok_or_else(|| RenderFailure::bad_request("Recipe must be specified"))?,
        helpers: field("helpers"),
    })
}

fn evaluate(template: &StoredTemplate, data: &Value) -> Result<String, RenderFailure> {
    match template.engine.as_str() {
        "none" => Ok(template.content.clone()),
        "jsrender" => substitute(&template.content, "{{:", |expr| {
            match expr.strip_prefix('~') {
                Some(call) => call_helper(call, template.helpers.as_deref()),
                None => Ok(lookup(data, expr)),
            }
        }),
        "handlebars" => substitute(&template.content, "{{", |expr| Ok(lookup(data, expr))),
        other => Err(RenderFailure::bad_request(format!(
            "Engine '{other}' not found. If this is a custom engine make sure it's properly installed from npm."
        ))),
    }
}

/// Replace every `open ... }}` tag with the resolved expression. An
/// unterminated tag is kept literally.
fn substitute(
    content: &str,
    open: &str,
    resolve: impl Fn(&str) -> Result<String, RenderFailure>,
) -> Result<String, RenderFailure> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some((before, after)) = rest.split_once(open) {
        out.push_str(before);
        match after.split_once("}}") {
            Some((expr, tail)) => {
                out.push_str(&resolve(expr.trim())?);
                rest = tail;
            }
            None => {
                out.push_str(open);
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn call_helper(call: &str, helpers: Option<&str>) -> Result<String, RenderFailure> {
    let name = call.split('(').next().unwrap_or(call).trim();
    let declared = helpers.is_some_and(|h| h.contains(&format!("function {name}(")));
    if declared {
        Ok(String::new())
    } else {
        Err(RenderFailure::bad_request(format!(
            "Error when processing render request: helper \"{name}\" is not defined"
        )))
    }
}

/// Resolve a dotted path against the input data.
fn lookup(data: &Value, path: &str) -> String {
    let value = path
        .split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(data, |current, segment| current.get(segment));
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn apply_recipe(recipe: &str, content: String, preview: bool) -> Result<Rendered, RenderFailure> {
    match recipe {
        "html" => Ok(Rendered {
            body: content.into_bytes(),
            content_type: "text/html",
            extension: "html",
        }),
        "text" => Ok(Rendered {
            body: content.into_bytes(),
            content_type: "text/plain",
            extension: "txt",
        }),
        "phantom-pdf" | "chrome-pdf" => Ok(Rendered {
            body: stub_pdf(&content),
            content_type: "application/pdf",
            extension: "pdf",
        }),
        "html-to-xlsx" if preview => Ok(Rendered {
            body: format!(
                "<html><body><iframe style=\"width:100%;height:100%\" srcdoc=\"{}\"></iframe></body></html>",
                content.replace('"', "&quot;")
            )
            .into_bytes(),
            content_type: "text/html",
            extension: "html",
        }),
        "html-to-xlsx" => {
            let mut body = b"PK\x03\x04".to_vec();
            body.extend_from_slice(content.as_bytes());
            Ok(Rendered {
                body,
                content_type: XLSX_CONTENT_TYPE,
                extension: "xlsx",
            })
        }
        other => Err(RenderFailure::bad_request(format!(
            "Recipe '{other}' not found. If this is a custom recipe make sure it's properly installed from npm."
        ))),
    }
}

/// A tiny but well-formed PDF carrying `text` in a comment.
fn stub_pdf(text: &str) -> Vec<u8> {
    format!(
        "%PDF-1.4\n\
         1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
         2 0 obj << /Type /Pages /Kids [] /Count 0 >> endobj\n\
         % {}\n\
         trailer << /Root 1 0 R >>\n\
         %%EOF\n",
        text.replace('\n', " ")
    )
    .into_bytes()
}
