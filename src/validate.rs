//! Settings file validation (friendly errors)
//!
//! Purpose:
//! - Catch hand-edited settings mistakes before the preview starts
//! - Explain *what* is wrong, *where* it lives, and *what to do*
//! - Never block startup: the engine fills or migrates what it can

use std::collections::BTreeSet;

use serde_json::Value;
use videofilters_engine::check_shader;
use videofilters_engine::settings::{ADVANCED_PIP_KEY, DEFAULTS_KEY, DEFAULT_TEMPLATE};
use videofilters_engine::validate::ValidationIssue;

/// Every slider range stored under `defaults`.
pub const RANGE_KEYS: [&str; 10] = [
    "brightness",
    "contrast",
    "saturate",
    "invert",
    "sepia",
    "opacity",
    "grayscale",
    "hueRotate",
    "blur",
    "playbackRate",
];

fn num(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(Value::as_f64)
}

fn validate_range(key: &str, r: &Value, issues: &mut Vec<ValidationIssue>) {
    let base = format!("settings:/{DEFAULTS_KEY}/{key}");
    let (Some(v), Some(min), Some(max), Some(step)) = (num(r, "v"), num(r, "min"), num(r, "max"), num(r, "step")) else {
        issues.push(ValidationIssue::error(
            base,
            "range needs numeric v, min, max and step",
            Some("expected: { \"v\": 1, \"min\": 0, \"max\": 3, \"step\": 0.05 }".into()),
        ));
        return;
    };
    if min >= max {
        issues.push(ValidationIssue::error(
            format!("{base}/min"),
            format!("min ({min}) must be below max ({max})"),
            None,
        ));
    }
    if !(min..=max).contains(&v) {
        issues.push(ValidationIssue::warn(
            format!("{base}/v"),
            format!("neutral value {v} is outside [{min}, {max}]"),
            Some("the slider reset will clamp it".into()),
        ));
    }
    if step <= 0.0 {
        issues.push(ValidationIssue::error(format!("{base}/step"), format!("step must be positive, got {step}"), None));
    }
}

fn validate_templates(templates: &Value, issues: &mut Vec<ValidationIssue>) {
    let base = format!("settings:/{DEFAULTS_KEY}/templates");
    let Some(arr) = templates.as_array() else {
        issues.push(ValidationIssue::error(base, "templates must be an array", None));
        return;
    };
    let mut seen = BTreeSet::new();
    for (i, t) in arr.iter().enumerate() {
        let path = format!("{base}/{i}");
        match t.get("name").and_then(Value::as_str).map(str::trim) {
            None | Some("") => issues.push(ValidationIssue::error(
                format!("{path}/name"),
                "preset without a name",
                Some("give it a name or delete the entry".into()),
            )),
            Some(DEFAULT_TEMPLATE) => issues.push(ValidationIssue::warn(
                format!("{path}/name"),
                format!("'{DEFAULT_TEMPLATE}' is built in; this entry is ignored"),
                None,
            )),
            Some(n) => {
                if !seen.insert(n.to_string()) {
                    issues.push(ValidationIssue::warn(
                        format!("{path}/name"),
                        format!("duplicate preset name '{n}'"),
                        Some("only the first one can be selected".into()),
                    ));
                }
            }
        }
        if t.get("pf").map_or(true, |pf| !pf.is_object()) {
            issues.push(ValidationIssue::error(format!("{path}/pf"), "missing or non-object filter values", None));
        }
        if num(t, "playbackRate").is_none() {
            issues.push(ValidationIssue::warn(format!("{path}/playbackRate"), "missing or non-numeric playback rate", None));
        }
    }
}

/// Validate the whole settings file (the object a `JsonFileStore` writes).
pub fn validate_settings_json(doc: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(defaults) = doc.get(DEFAULTS_KEY) else {
        issues.push(ValidationIssue::warn(
            format!("settings:/{DEFAULTS_KEY}"),
            "no stored defaults",
            Some("the built-in document is written on first start".into()),
        ));
        return issues;
    };
    if !defaults.is_object() {
        issues.push(ValidationIssue::error(format!("settings:/{DEFAULTS_KEY}"), "defaults must be an object", None));
        return issues;
    }

    for key in RANGE_KEYS {
        match defaults.get(key) {
            Some(r) => validate_range(key, r, &mut issues),
            None => issues.push(ValidationIssue::warn(
                format!("settings:/{DEFAULTS_KEY}/{key}"),
                "missing range",
                Some("the built-in range is merged in on load".into()),
            )),
        }
    }

    if let Some(t) = defaults.get("templates") {
        validate_templates(t, &mut issues);
    }

    match defaults.get("shader").and_then(|s| s.get("fragment")).and_then(Value::as_str) {
        Some(frag) if !frag.trim().is_empty() => {
            issues.extend(check_shader(frag).to_issues(&format!("settings:/{DEFAULTS_KEY}/shader/fragment")));
        }
        _ => issues.push(ValidationIssue::warn(
            format!("settings:/{DEFAULTS_KEY}/shader"),
            "no fragment shader stored",
            Some("the built-in shader is filled in on load".into()),
        )),
    }

    if let Some(v) = doc.get(ADVANCED_PIP_KEY) {
        if !v.is_boolean() {
            issues.push(ValidationIssue::warn(
                format!("settings:/{ADVANCED_PIP_KEY}"),
                "expected true or false",
                None,
            ));
        }
    }

    issues
}
