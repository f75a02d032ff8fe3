//! Uniform sliders bound to a shader session.
//!
//! Pure state: the popup renders it, feeds user input in, and forwards the
//! returned [`UniformUpdate`] to the page as one `UpdateUniform` command.

use crate::uniforms::{UniformSchema, UniformSpec};

/// Slider granularity for every uniform.
pub const SLIDER_STEP: f64 = 0.1;

/// One value change to send to the session. Never more than one per input.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformUpdate {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformControl {
    pub spec: UniformSpec,
    pub value: f64,
    pub enabled: bool,
}

impl UniformControl {
    fn new(spec: UniformSpec) -> Self {
        let value = spec.default;
        Self { spec, value, enabled: false }
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    /// Numeric readout next to the slider.
    pub fn readout(&self) -> String {
        format!("{:.1}", self.value)
    }

    pub fn can_reset(&self) -> bool {
        self.enabled && self.value != self.spec.default
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPanel {
    shader_id: String,
    controls: Vec<UniformControl>,
    active: bool,
}

impl ControlPanel {
    /// One disabled control per schema uniform, at its default.
    pub fn new(shader_id: impl Into<String>, schema: &UniformSchema) -> Self {
        Self {
            shader_id: shader_id.into(),
            controls: schema.uniforms.iter().cloned().map(UniformControl::new).collect(),
            active: false,
        }
    }

    pub fn shader_id(&self) -> &str {
        &self.shader_id
    }

    pub fn controls(&self) -> &[UniformControl] {
        &self.controls
    }

    pub fn control(&self, name: &str) -> Option<&UniformControl> {
        self.controls.iter().find(|c| c.spec.name == name)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn uniform_names(&self) -> Vec<String> {
        self.controls.iter().map(|c| c.spec.name.clone()).collect()
    }

    pub fn specs(&self) -> Vec<UniformSpec> {
        self.controls.iter().map(|c| c.spec.clone()).collect()
    }

    /// Element id of the slider for `name`.
    pub fn element_id(&self, name: &str) -> String {
        format!("slider-{}-{}", self.shader_id, name)
    }

    /// Session just started: enable every control.
    pub fn activate(&mut self) {
        self.active = true;
        for c in &mut self.controls {
            c.enabled = true;
        }
    }

    /// Session already running on the page: enable and adopt its values.
    pub fn activate_with(&mut self, values: &[(String, f64)]) {
        self.activate();
        for (name, v) in values {
            if let Some(c) = self.controls.iter_mut().find(|c| &c.spec.name == name) {
                c.value = c.spec.clamp(*v);
            }
        }
    }

    /// Session gone: back to defaults, disabled.
    pub fn deactivate(&mut self) {
        self.active = false;
        for c in &mut self.controls {
            c.value = c.spec.default;
            c.enabled = false;
        }
    }

    /// Slider moved. `None` while disabled or for unknown names.
    pub fn input(&mut self, name: &str, value: f64) -> Option<UniformUpdate> {
        if !value.is_finite() {
            return None;
        }
        let c = self.controls.iter_mut().find(|c| c.spec.name == name && c.enabled)?;
        c.value = c.spec.clamp(value);
        Some(UniformUpdate { name: c.spec.name.clone(), value: c.value })
    }

    pub fn reset(&mut self, name: &str) -> Option<UniformUpdate> {
        let c = self.controls.iter_mut().find(|c| c.spec.name == name && c.enabled)?;
        c.value = c.spec.default;
        Some(UniformUpdate { name: c.spec.name.clone(), value: c.value })
    }
}
