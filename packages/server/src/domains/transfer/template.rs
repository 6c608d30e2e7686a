//! Safe, whitelisted string interpolation for title/description templates.
//!
//! Grammar: `{name}` or `{name:format_spec}`. Unknown variable names are
//! rejected at validation time, not at render time. Rendering never panics
//! or propagates an error to the caller — on any failure it logs a warning
//! and returns the raw template unchanged.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

pub const ALLOWED_TEMPLATE_VARS: &[&str] = &[
    "label_id",
    "sport",
    "sport_type",
    "start_time",
    "start_local",
    "duration_seconds",
    "duration_formatted",
    "distance_km",
    "distance_m",
    "name",
    "calories",
];

#[derive(Debug, Clone)]
pub enum ContextValue {
    Str(String),
    Int(i64),
    Float(f64),
    DateTime(Option<DateTime<Utc>>),
}

pub type TemplateContext = HashMap<&'static str, ContextValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateError {
    pub variable: String,
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "template variable '{}' is not allowed (allowed: {})",
            self.variable,
            ALLOWED_TEMPLATE_VARS.join(", ")
        )
    }
}

impl std::error::Error for TemplateError {}

/// A field reference `{name}` or `{name:spec}` found while scanning a template.
struct Field {
    start: usize,
    end: usize,
    name: String,
    spec: Option<String>,
}

fn scan_fields(template: &str) -> Vec<Field> {
    let bytes = template.as_bytes();
    let mut fields = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                i += 2;
                continue;
            }
            if let Some(close) = template[i..].find('}') {
                let end = i + close + 1;
                let inner = &template[i + 1..i + close];
                let (name, spec) = match inner.split_once(':') {
                    Some((n, s)) => (n.to_string(), Some(s.to_string())),
                    None => (inner.to_string(), None),
                };
                fields.push(Field {
                    start: i,
                    end,
                    name,
                    spec,
                });
                i = end;
                continue;
            }
        }
        i += 1;
    }
    fields
}

/// A validated template. Construction fails if any referenced variable is
/// outside `ALLOWED_TEMPLATE_VARS`.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    template: String,
}

impl TemplateRenderer {
    pub fn new(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        for field in scan_fields(&template) {
            if !field.name.is_empty() && !ALLOWED_TEMPLATE_VARS.contains(&field.name.as_str()) {
                return Err(TemplateError {
                    variable: field.name,
                });
            }
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render against `context`. Never fails: a value missing from context
    /// renders as empty string, and any formatting error falls back to the
    /// raw template text for that field.
    pub fn render(&self, context: &TemplateContext) -> String {
        let fields = scan_fields(&self.template);
        if fields.is_empty() {
            return self.template.clone();
        }

        let mut out = String::with_capacity(self.template.len());
        let mut cursor = 0;
        for field in &fields {
            out.push_str(&self.template[cursor..field.start]);
            out.push_str(&render_field(context, field));
            cursor = field.end;
        }
        out.push_str(&self.template[cursor..]);
        out
    }
}

fn render_field(context: &TemplateContext, field: &Field) -> String {
    let Some(value) = context.get(field.name.as_str()) else {
        return String::new();
    };

    match (value, field.spec.as_deref()) {
        (ContextValue::DateTime(Some(dt)), Some(spec)) => dt.format(spec).to_string(),
        (ContextValue::DateTime(Some(dt)), None) => dt.to_rfc3339(),
        (ContextValue::DateTime(None), _) => String::new(),
        (ContextValue::Str(s), _) => s.clone(),
        (ContextValue::Int(n), Some(spec)) => format_int(*n, spec),
        (ContextValue::Int(n), None) => n.to_string(),
        (ContextValue::Float(n), Some(spec)) => format_float(*n, spec),
        (ContextValue::Float(n), None) => {
            let mut s = String::new();
            let _ = write!(s, "{n}");
            s
        }
    }
}

/// Supports the subset of Python's `%02d`-style width specs used by the
/// bundled default templates (e.g. `02d`).
fn format_int(n: i64, spec: &str) -> String {
    if let Some(width) = spec.strip_suffix('d').and_then(|w| w.parse::<usize>().ok()) {
        format!("{n:0width$}")
    } else {
        n.to_string()
    }
}

fn format_float(n: f64, spec: &str) -> String {
    if let Some(precision) = spec.strip_suffix('f').and_then(|p| p.parse::<usize>().ok()) {
        format!("{n:.precision$}")
    } else {
        let mut s = String::new();
        let _ = write!(s, "{n}");
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_unknown_variable_at_validation_time() {
        let err = TemplateRenderer::new("{bogus}").unwrap_err();
        assert_eq!(err.variable, "bogus");
    }

    #[test]
    fn accepts_whitelisted_variables_with_format_spec() {
        assert!(TemplateRenderer::new("{sport} {start_local:%Y-%m-%d %H:%M}").is_ok());
    }

    #[test]
    fn renders_datetime_with_strftime_spec() {
        let renderer = TemplateRenderer::new("{start_local:%Y-%m-%d}").unwrap();
        let mut ctx = TemplateContext::new();
        ctx.insert(
            "start_local",
            ContextValue::DateTime(Some(Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap())),
        );
        assert_eq!(renderer.render(&ctx), "2024-01-15");
    }

    #[test]
    fn missing_context_key_renders_empty_string() {
        let renderer = TemplateRenderer::new("[{name}]").unwrap();
        let ctx = TemplateContext::new();
        assert_eq!(renderer.render(&ctx), "[]");
    }

    #[test]
    fn renders_whitelisted_combination_like_the_default_title_template() {
        let renderer = TemplateRenderer::new("{sport} {start_local:%Y-%m-%d %H:%M}").unwrap();
        let mut ctx = TemplateContext::new();
        ctx.insert("sport", ContextValue::Str("跑步".to_string()));
        ctx.insert(
            "start_local",
            ContextValue::DateTime(Some(Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap())),
        );
        assert_eq!(renderer.render(&ctx), "跑步 2024-01-15 08:30");
    }
}
