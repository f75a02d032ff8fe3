//! Extension-wide settings: filter ranges, presets and the shader source.
//!
//! Stored under two keys:
//! - `defaults`: the [`Defaults`] document
//! - `advancedPIPEnabled`: bool

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::EngineError;
use crate::filter::{FilterField, FilterState};
use crate::{logi, logw};
use crate::store::SettingsStore;
use crate::uniforms::UniformSchema;
use crate::validate;

pub const DEFAULTS_KEY: &str = "defaults";
pub const ADVANCED_PIP_KEY: &str = "advancedPIPEnabled";

/// Name of the built-in preset; it always exists and cannot be deleted.
pub const DEFAULT_TEMPLATE: &str = "default";

pub const DEFAULT_VERTEX_SHADER: &str = include_str!("../shaders/default.vert");
pub const DEFAULT_FRAGMENT_SHADER: &str = include_str!("../shaders/default.frag");

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterRange {
    /// Neutral value.
    pub v: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl FilterRange {
    const fn new(v: f64, min: f64, max: f64, step: f64) -> Self {
        Self { v, min, max, step }
    }

    /// Never panics, even when a hand-edited range is inverted.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    fn is_usable(&self) -> bool {
        [self.v, self.min, self.max, self.step].iter().all(|x| x.is_finite()) && self.min < self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderSource {
    fn default() -> Self {
        Self {
            vertex: DEFAULT_VERTEX_SHADER.to_string(),
            fragment: DEFAULT_FRAGMENT_SHADER.to_string(),
        }
    }
}

/// A named bundle of filter values and playback rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    pub pf: FilterState,
    pub playback_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    pub brightness: FilterRange,
    pub contrast: FilterRange,
    pub saturate: FilterRange,
    pub invert: FilterRange,
    pub sepia: FilterRange,
    pub opacity: FilterRange,
    pub grayscale: FilterRange,
    pub hue_rotate: FilterRange,
    pub blur: FilterRange,
    pub playback_rate: FilterRange,
    pub templates: Vec<Template>,
    pub shader: ShaderSource,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            brightness: FilterRange::new(1.0, 0.0, 3.0, 0.05),
            contrast: FilterRange::new(1.0, 0.0, 3.0, 0.05),
            saturate: FilterRange::new(1.0, 0.0, 3.0, 0.05),
            invert: FilterRange::new(0.0, 0.0, 1.0, 0.05),
            sepia: FilterRange::new(0.0, 0.0, 1.0, 0.05),
            opacity: FilterRange::new(1.0, 0.0, 1.0, 0.05),
            grayscale: FilterRange::new(0.0, 0.0, 1.0, 0.05),
            hue_rotate: FilterRange::new(0.0, 0.0, 360.0, 1.0),
            blur: FilterRange::new(0.0, 0.0, 16.0, 1.0),
            playback_rate: FilterRange::new(1.0, 0.1, 4.0, 0.1),
            templates: Vec::new(),
            shader: ShaderSource::default(),
        }
    }
}

impl Defaults {
    pub fn range(&self, field: FilterField) -> &FilterRange {
        match field {
            FilterField::Blur => &self.blur,
            FilterField::Brightness => &self.brightness,
            FilterField::Contrast => &self.contrast,
            FilterField::Saturate => &self.saturate,
            FilterField::Invert => &self.invert,
            FilterField::Sepia => &self.sepia,
            FilterField::Opacity => &self.opacity,
            FilterField::Grayscale => &self.grayscale,
            FilterField::HueRotate => &self.hue_rotate,
        }
    }

    /// Filter state with every field at its neutral value.
    pub fn neutral_filter(&self) -> FilterState {
        let mut pf = FilterState::default();
        for f in FilterField::ALL {
            pf.set(f, self.range(f).v);
        }
        pf
    }

    pub fn default_template(&self) -> Template {
        Template {
            name: DEFAULT_TEMPLATE.to_string(),
            pf: self.neutral_filter(),
            playback_rate: self.playback_rate.v,
        }
    }
}

fn is_blank(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Bring a stored `defaults` document up to the current shape. Returns true if
/// anything changed.
fn migrate(doc: &mut Value) -> Result<bool, EngineError> {
    let Value::Object(map) = doc else {
        return Err(EngineError::InvalidSettings {
            key: DEFAULTS_KEY.into(),
            msg: "expected an object".into(),
        });
    };
    let builtin = serde_json::to_value(Defaults::default()).map_err(|e| EngineError::InvalidSettings {
        key: DEFAULTS_KEY.into(),
        msg: e.to_string(),
    })?;
    let mut changed = false;

    // legacy name
    if !map.contains_key("saturate") {
        if let Some(old) = map.get("saturation").cloned() {
            logi!("SETTINGS", "migrating 'saturation' -> 'saturate'");
            map.insert("saturate".into(), old);
            changed = true;
        }
    }

    if is_blank(map.get("templates")) {
        map.insert("templates".into(), json!([]));
        changed = true;
    }

    if !matches!(map.get("shader"), Some(Value::Object(_))) {
        map.insert("shader".into(), builtin["shader"].clone());
        changed = true;
    }
    if let Some(Value::Object(shader)) = map.get_mut("shader") {
        for stage in ["vertex", "fragment"] {
            if is_blank(shader.get(stage)) {
                logi!("SETTINGS", "filling missing shader.{stage} with the built-in source");
                shader.insert(stage.into(), builtin["shader"][stage].clone());
                changed = true;
            }
        }
    }

    // any other missing range: additive merge
    if let Value::Object(b) = &builtin {
        for (k, v) in b {
            if !map.contains_key(k) {
                map.insert(k.clone(), v.clone());
                changed = true;
            }
        }
        // inverted or empty ranges fall back to the built-in one
        for (k, v) in b {
            if serde_json::from_value::<FilterRange>(v.clone()).is_err() {
                continue;
            }
            let usable = map
                .get(k)
                .and_then(|r| serde_json::from_value::<FilterRange>(r.clone()).ok())
                .map_or(true, |r| r.is_usable());
            if !usable {
                logw!("SETTINGS", "range '{k}' needs min < max; using the built-in range");
                map.insert(k.clone(), v.clone());
                changed = true;
            }
        }
    }

    Ok(changed)
}

/// Loaded settings bound to their store. Every mutation writes through.
#[derive(Debug)]
pub struct Settings<S: SettingsStore> {
    store: S,
    defaults: Defaults,
}

impl<S: SettingsStore> Settings<S> {
    /// Read `defaults`, writing the built-in document on first use and the
    /// migrated document when an older shape was found.
    pub fn load(mut store: S) -> Result<Self, EngineError> {
        let defaults = match store.get(DEFAULTS_KEY)? {
            None => {
                logi!("SETTINGS", "no stored defaults; writing built-in document");
                let d = Defaults::default();
                store.set(DEFAULTS_KEY, to_value(&d)?)?;
                d
            }
            Some(mut doc) => {
                if migrate(&mut doc)? {
                    store.set(DEFAULTS_KEY, doc.clone())?;
                }
                serde_json::from_value(doc).map_err(|e| EngineError::InvalidSettings {
                    key: DEFAULTS_KEY.into(),
                    msg: e.to_string(),
                })?
            }
        };
        Ok(Self { store, defaults })
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn shader(&self) -> &ShaderSource {
        &self.defaults.shader
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Re-read from the store, picking up writes made elsewhere.
    pub fn reload(&mut self) -> Result<(), EngineError> {
        let doc = self.store.get(DEFAULTS_KEY)?;
        if let Some(mut doc) = doc {
            migrate(&mut doc)?;
            self.defaults = serde_json::from_value(doc).map_err(|e| EngineError::InvalidSettings {
                key: DEFAULTS_KEY.into(),
                msg: e.to_string(),
            })?;
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), EngineError> {
        let v = to_value(&self.defaults)?;
        self.store.set(DEFAULTS_KEY, v)
    }

    /// Store an edited shader. Both the uniform schema and the required lines
    /// must pass; otherwise nothing is written and every error is returned.
    pub fn commit_shader(&mut self, source: ShaderSource) -> Result<UniformSchema, EngineError> {
        let report = validate::check_shader(&source.fragment);
        if !report.is_valid() {
            return Err(EngineError::ShaderRejected { errors: report.all_errors() });
        }
        let schema = UniformSchema::from_source(&source.fragment);
        self.defaults.shader = source;
        self.persist()?;
        logi!("SETTINGS", "shader committed ({} uniforms)", schema.uniforms.len());
        Ok(schema)
    }

    /// Look up a preset by name. [`DEFAULT_TEMPLATE`] resolves to the neutral
    /// values unless a stored preset shadows it.
    pub fn template(&self, name: &str) -> Option<Template> {
        self.defaults
            .templates
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .or_else(|| (name == DEFAULT_TEMPLATE).then(|| self.defaults.default_template()))
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names = vec![DEFAULT_TEMPLATE.to_string()];
        names.extend(
            self.defaults
                .templates
                .iter()
                .filter(|t| t.name != DEFAULT_TEMPLATE)
                .map(|t| t.name.clone()),
        );
        names
    }

    /// Save `template`, replacing any preset with the same name. The saved
    /// preset moves to the end of the list.
    pub fn save_template(&mut self, template: Template) -> Result<(), EngineError> {
        if template.name.trim().is_empty() {
            return Err(EngineError::InvalidSettings {
                key: "templates".into(),
                msg: "preset name is empty".into(),
            });
        }
        self.defaults.templates.retain(|t| t.name != template.name);
        self.defaults.templates.push(template);
        self.persist()
    }

    /// Returns false if nothing was deleted. The default preset is never deleted.
    pub fn delete_template(&mut self, name: &str) -> Result<bool, EngineError> {
        if name == DEFAULT_TEMPLATE {
            return Ok(false);
        }
        let before = self.defaults.templates.len();
        self.defaults.templates.retain(|t| t.name != name);
        if self.defaults.templates.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn advanced_pip(&self) -> Result<bool, EngineError> {
        Ok(matches!(self.store.get(ADVANCED_PIP_KEY)?, Some(Value::Bool(true))))
    }

    pub fn set_advanced_pip(&mut self, enabled: bool) -> Result<(), EngineError> {
        self.store.set(ADVANCED_PIP_KEY, Value::Bool(enabled))
    }
}

fn to_value<T: Serialize>(v: &T) -> Result<Value, EngineError> {
    serde_json::to_value(v).map_err(|e| EngineError::InvalidSettings {
        key: DEFAULTS_KEY.into(),
        msg: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn first_load_writes_builtin_document() {
        let s = Settings::load(MemoryStore::new()).unwrap();
        assert_eq!(s.defaults(), &Defaults::default());
        let stored = s.store().get(DEFAULTS_KEY).unwrap().unwrap();
        assert_eq!(stored["hueRotate"]["max"], json!(360.0));
        assert_eq!(stored["playbackRate"]["min"], json!(0.1));
        assert_eq!(stored["templates"], json!([]));
    }

    #[test]
    fn legacy_document_is_migrated_and_written_back() {
        let mut legacy = serde_json::to_value(Defaults::default()).unwrap();
        let obj = legacy.as_object_mut().unwrap();
        obj.remove("saturate");
        obj.insert("saturation".into(), json!({"v": 1, "min": 0, "max": 2.5, "step": 0.05}));
        obj.remove("templates");
        obj.insert("shader".into(), json!({"vertex": "", "fragment": "custom"}));

        let s = Settings::load(MemoryStore::new().with(DEFAULTS_KEY, legacy)).unwrap();
        assert_eq!(s.defaults().saturate.max, 2.5);
        assert!(s.defaults().templates.is_empty());
        assert_eq!(s.shader().vertex, DEFAULT_VERTEX_SHADER);
        assert_eq!(s.shader().fragment, "custom");

        let stored = s.store().get(DEFAULTS_KEY).unwrap().unwrap();
        assert_eq!(stored["saturate"]["max"], json!(2.5));
        assert_eq!(stored["shader"]["fragment"], json!("custom"));
    }

    #[test]
    fn missing_shader_block_is_filled() {
        let mut doc = serde_json::to_value(Defaults::default()).unwrap();
        doc.as_object_mut().unwrap().remove("shader");
        let s = Settings::load(MemoryStore::new().with(DEFAULTS_KEY, doc)).unwrap();
        assert_eq!(s.shader(), &ShaderSource::default());
    }

    #[test]
    fn inverted_range_is_replaced_with_builtin() {
        let mut doc = serde_json::to_value(Defaults::default()).unwrap();
        doc["brightness"] = json!({"v": 1, "min": 3, "max": 0.5, "step": 0.05});
        doc["blur"] = json!({"v": 0, "min": 4, "max": 4, "step": 1});
        let mut s = Settings::load(MemoryStore::new().with(DEFAULTS_KEY, doc.clone())).unwrap();
        assert_eq!(s.defaults().brightness, Defaults::default().brightness);
        assert_eq!(s.defaults().blur, Defaults::default().blur);
        assert_eq!(s.store().get(DEFAULTS_KEY).unwrap().unwrap()["brightness"]["max"], json!(3.0));

        s.store.set(DEFAULTS_KEY, doc).unwrap();
        s.reload().unwrap();
        assert_eq!(s.defaults().brightness, Defaults::default().brightness);
    }

    #[test]
    fn range_clamp_tolerates_inverted_bounds() {
        let r = FilterRange::new(1.0, 3.0, 0.5, 0.05);
        assert_eq!(r.clamp(2.0), 0.5);
        assert_eq!(FilterRange::new(1.0, 0.0, 3.0, 0.05).clamp(9.0), 3.0);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let r = Settings::load(MemoryStore::new().with(DEFAULTS_KEY, json!("nope")));
        assert!(matches!(r, Err(EngineError::InvalidSettings { .. })));
    }

    #[test]
    fn commit_rejects_invalid_shader_and_keeps_old_source() {
        let mut s = Settings::load(MemoryStore::new()).unwrap();
        let bad = ShaderSource {
            vertex: DEFAULT_VERTEX_SHADER.into(),
            fragment: DEFAULT_FRAGMENT_SHADER.replace("varying vec2 v_texCoord;", ""),
        };
        match s.commit_shader(bad) {
            Err(EngineError::ShaderRejected { errors }) => {
                assert_eq!(errors, ["Missing required line: varying vec2 v_texCoord;"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(s.shader().fragment, DEFAULT_FRAGMENT_SHADER);
    }

    #[test]
    fn commit_valid_shader_persists_and_returns_schema() {
        let mut s = Settings::load(MemoryStore::new()).unwrap();
        let fragment = DEFAULT_FRAGMENT_SHADER.replace(
            "uniform float u_vignette;  // [min: 0, max: 2, default: 0, label: Vignette]",
            "uniform float u_vignette;  // [min: 0, max: 1, default: 0.5, label: Vig]",
        );
        let schema = s
            .commit_shader(ShaderSource { vertex: DEFAULT_VERTEX_SHADER.into(), fragment: fragment.clone() })
            .unwrap();
        assert_eq!(schema.get("u_vignette").map(|u| u.label.as_str()), Some("Vig"));
        let stored = s.store().get(DEFAULTS_KEY).unwrap().unwrap();
        assert_eq!(stored["shader"]["fragment"], json!(fragment));
    }

    #[test]
    fn presets_replace_by_name_and_default_is_protected() {
        let mut s = Settings::load(MemoryStore::new()).unwrap();
        let mut pf = FilterState::default();
        pf.sepia = 0.5;
        s.save_template(Template { name: "warm".into(), pf, playback_rate: 1.5 }).unwrap();
        s.save_template(Template { name: "cold".into(), pf: FilterState::default(), playback_rate: 1.0 }).unwrap();
        pf.sepia = 0.8;
        s.save_template(Template { name: "warm".into(), pf, playback_rate: 2.0 }).unwrap();

        assert_eq!(s.template_names(), ["default", "cold", "warm"]);
        assert_eq!(s.template("warm").map(|t| t.playback_rate), Some(2.0));

        assert!(!s.delete_template(DEFAULT_TEMPLATE).unwrap());
        assert!(s.delete_template("cold").unwrap());
        assert!(!s.delete_template("cold").unwrap());
        assert_eq!(s.template_names(), ["default", "warm"]);

        let d = s.template(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(d.pf, FilterState::default());
        assert_eq!(d.playback_rate, 1.0);
    }

    #[test]
    fn empty_preset_name_is_refused() {
        let mut s = Settings::load(MemoryStore::new()).unwrap();
        let t = Template { name: "  ".into(), pf: FilterState::default(), playback_rate: 1.0 };
        assert!(s.save_template(t).is_err());
    }

    #[test]
    fn advanced_pip_flag() {
        let mut s = Settings::load(MemoryStore::new()).unwrap();
        assert!(!s.advanced_pip().unwrap());
        s.set_advanced_pip(true).unwrap();
        assert!(s.advanced_pip().unwrap());
    }

    #[test]
    fn neutral_filter_matches_css_defaults() {
        assert_eq!(Defaults::default().neutral_filter(), FilterState::default());
    }
}
