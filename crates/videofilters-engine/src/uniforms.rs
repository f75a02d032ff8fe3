//! Uniform annotation parser.
//!
//! A user-controllable uniform is a declaration followed, on the same line, by
//! a bracketed line comment of `key: value` pairs:
//!
//! ```glsl
//! uniform float u_sharpness;  // [min: 0, max: 3, default: 0, label: Sharpness]
//! ```
//!
//! Declarations without the trailing annotation are not part of the schema.
//! Parsing never fails: malformed pairs come through as non-numeric values and
//! are reported by [`crate::validate::validate_uniform`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::validate;

/// One annotation value as written in the shader comment.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Bool(bool),
    Text(String),
    /// The pair had no `:` separator.
    Missing,
}

impl RawValue {
    fn parse(key: &str, value: Option<&str>) -> Self {
        let Some(v) = value else {
            return RawValue::Missing;
        };
        if key == "label" {
            return RawValue::Text(v.to_string());
        }
        match v {
            "true" => RawValue::Bool(true),
            "false" => RawValue::Bool(false),
            _ => match v.parse::<f64>() {
                Ok(n) if !v.is_empty() => RawValue::Number(n),
                _ => RawValue::Text(v.to_string()),
            },
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// A uniform declaration plus its annotation, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUniform {
    pub name: String,
    /// Declared GLSL type (`float`, `vec2`, ...), carried through untouched.
    pub ty: String,
    props: Vec<(String, RawValue)>,
}

impl RawUniform {
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn props(&self) -> &[(String, RawValue)] {
        &self.props
    }

    fn insert(&mut self, key: String, value: RawValue) {
        match self.props.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.props.push((key, value)),
        }
    }
}

fn annotated_uniform_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"uniform\s+(\w+)\s+(\w+)\s*;[ \t]*//[ \t]*\[([^\]\n]*)\]")
            .expect("valid uniform annotation regex")
    })
}

/// Extract every annotated uniform from `src`, in declaration order.
///
/// A name declared twice keeps its first position and the last annotation.
pub fn parse_shader_uniforms(src: &str) -> Vec<RawUniform> {
    let mut out: Vec<RawUniform> = Vec::new();

    for cap in annotated_uniform_re().captures_iter(src) {
        let ty = cap[1].to_string();
        let name = cap[2].to_string();

        let mut raw = RawUniform {
            name: name.clone(),
            ty,
            props: Vec::new(),
        };
        for pair in cap[3].trim().split(',') {
            let (key, value) = match pair.split_once(':') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (pair.trim(), None),
            };
            raw.insert(key.to_string(), RawValue::parse(key, value));
        }

        match out.iter_mut().find(|u| u.name == name) {
            Some(existing) => *existing = raw,
            None => out.push(raw),
        }
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformType {
    Float,
}

/// A validated, float-typed shader control.
///
/// Invariants: `min < max` and `min <= default <= max`, all finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: UniformType,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub label: String,
}

impl UniformSpec {
    pub fn from_raw(raw: &RawUniform) -> Result<Self, Vec<String>> {
        let errors = validate::validate_uniform(raw);
        if !errors.is_empty() {
            return Err(errors);
        }

        let num = |k: &str| raw.get(k).and_then(RawValue::as_number).unwrap_or_default();
        let label = match raw.get("label") {
            Some(RawValue::Text(s)) if !s.is_empty() => s.clone(),
            _ => raw.name.clone(),
        };

        Ok(Self {
            name: raw.name.clone(),
            ty: UniformType::Float,
            min: num("min"),
            max: num("max"),
            default: num("default"),
            label,
        })
    }

    /// Re-check a spec that did not come from [`UniformSpec::from_raw`],
    /// e.g. one deserialized from a page command. Same messages as the
    /// annotation validator.
    pub fn problems(&self) -> Vec<String> {
        if ![self.min, self.max, self.default].iter().all(|v| v.is_finite()) {
            return vec!["Values must be numbers".to_string()];
        }
        let mut errors = Vec::new();
        if self.max <= self.min {
            errors.push("Max must be greater than min".to_string());
        }
        if self.default < self.min || self.default > self.max {
            errors.push("Default value must be within min/max range".to_string());
        }
        errors
    }

    /// Never panics, even on an inverted range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// The controllable schema of one fragment shader source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformSchema {
    /// Valid uniforms, in declaration order.
    pub uniforms: Vec<UniformSpec>,
    /// Uniforms whose annotation failed validation, with their errors.
    pub rejected: Vec<(String, Vec<String>)>,
}

impl UniformSchema {
    pub fn from_source(fragment: &str) -> Self {
        let mut schema = Self::default();
        for raw in parse_shader_uniforms(fragment) {
            match UniformSpec::from_raw(&raw) {
                Ok(spec) => schema.uniforms.push(spec),
                Err(errors) => schema.rejected.push((raw.name.clone(), errors)),
            }
        }
        schema
    }

    pub fn is_valid(&self) -> bool {
        self.rejected.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&UniformSpec> {
        self.uniforms.iter().find(|u| u.name == name)
    }
}
