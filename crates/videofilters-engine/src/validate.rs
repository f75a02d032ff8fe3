//! Shader validation (friendly errors)
//!
//! Two independent checks gate whether an edited shader may be committed:
//! - every annotated uniform passes [`validate_uniform`]
//! - the fixed boilerplate lines the render loop binds against are present
//!
//! Errors are plain strings so they can be rendered inline next to the
//! offending control. [`ValidationIssue`] adds a location + hint for logs.

use crate::uniforms::{parse_shader_uniforms, RawUniform, RawValue};
use crate::{loge, logi, logw};

/// Lines every fragment shader must contain verbatim (whitespace-insensitive).
pub const REQUIRED_LINES: [&str; 4] = [
    "precision mediump float;",
    "uniform sampler2D u_texture;",
    "uniform vec2 u_textureSize;",
    "varying vec2 v_texCoord;",
];

/// Validate one parsed uniform annotation.
///
/// Rules run in order. A wrong type or a non-numeric range stops the checks
/// for that entry; the two range checks are reported together.
pub fn validate_uniform(raw: &RawUniform) -> Vec<String> {
    if raw.ty != "float" {
        return vec![format!("Type must be float not '{}'", raw.ty)];
    }

    let finite = |k: &str| raw.get(k).and_then(RawValue::as_number).filter(|n| n.is_finite());
    let (Some(min), Some(max), Some(default)) = (finite("min"), finite("max"), finite("default")) else {
        return vec!["Values must be numbers".to_string()];
    };

    let mut errors = Vec::new();
    if max <= min {
        errors.push("Max must be greater than min".to_string());
    }
    if default < min || default > max {
        errors.push("Default value must be within min/max range".to_string());
    }
    errors
}

fn normalize_line(line: &str) -> String {
    let code = line.split("//").next().unwrap_or("");
    code.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One error per required line that does not appear in `src`.
pub fn missing_required_lines(src: &str) -> Vec<String> {
    let present: Vec<String> = src.lines().map(normalize_line).collect();
    REQUIRED_LINES
        .iter()
        .filter(|req| !present.iter().any(|l| l == *req))
        .map(|req| format!("Missing required line: {req}"))
        .collect()
}

/// Combined result of both shader checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderReport {
    pub uniform_errors: Vec<(String, Vec<String>)>,
    pub missing_lines: Vec<String>,
}

impl ShaderReport {
    pub fn is_valid(&self) -> bool {
        self.uniform_errors.is_empty() && self.missing_lines.is_empty()
    }

    /// Every error as one flat, human-readable list.
    pub fn all_errors(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .uniform_errors
            .iter()
            .flat_map(|(name, errs)| errs.iter().map(move |e| format!("{name}: {e}")))
            .collect();
        out.extend(self.missing_lines.iter().cloned());
        out
    }

    pub fn to_issues(&self, label: &str) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (name, errs) in &self.uniform_errors {
            for e in errs {
                issues.push(ValidationIssue::error(
                    format!("{label}:/uniforms/{name}"),
                    e.clone(),
                    Some("annotation format: // [min: 0, max: 1, default: 0, label: Name]".into()),
                ));
            }
        }
        for m in &self.missing_lines {
            issues.push(ValidationIssue::error(
                format!("{label}:/boilerplate"),
                m.clone(),
                Some("the render loop binds u_texture, u_textureSize and v_texCoord by name".into()),
            ));
        }
        issues
    }
}

pub fn check_shader(fragment: &str) -> ShaderReport {
    let uniform_errors = parse_shader_uniforms(fragment)
        .iter()
        .filter_map(|raw| {
            let errs = validate_uniform(raw);
            (!errs.is_empty()).then(|| (raw.name.clone(), errs))
        })
        .collect();

    ShaderReport {
        uniform_errors,
        missing_lines: missing_required_lines(fragment),
    }
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    pub path: String,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    Warn,
    Error,
}

impl ValidationIssue {
    pub fn warn(path: impl Into<String>, message: impl Into<String>, hint: Option<String>) -> Self {
        Self { level: IssueLevel::Warn, path: path.into(), message: message.into(), hint }
    }
    pub fn error(path: impl Into<String>, message: impl Into<String>, hint: Option<String>) -> Self {
        Self { level: IssueLevel::Error, path: path.into(), message: message.into(), hint }
    }
}

pub fn emit_issues(tag: &str, issues: &[ValidationIssue]) {
    for it in issues {
        match (it.level, &it.hint) {
            (IssueLevel::Warn, Some(h)) => logw!(tag, "{}: {} (hint: {})", it.path, it.message, h),
            (IssueLevel::Warn, None) => logw!(tag, "{}: {}", it.path, it.message),
            (IssueLevel::Error, Some(h)) => loge!(tag, "{}: {} (hint: {})", it.path, it.message, h),
            (IssueLevel::Error, None) => loge!(tag, "{}: {}", it.path, it.message),
        }
    }
}

/// Emit a one-line summary even when there are zero issues.
pub fn emit_summary(tag: &str, label: &str, issues: &[ValidationIssue]) {
    let warns = issues.iter().filter(|i| i.level == IssueLevel::Warn).count();
    let errs = issues.iter().filter(|i| i.level == IssueLevel::Error).count();
    if errs == 0 && warns == 0 {
        logi!(tag, "validation: {label} OK (0 issues)");
    } else {
        logw!(tag, "validation: {label} issues found (errors={errs} warnings={warns})");
    }
}
