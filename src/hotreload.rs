//! Hot-reload watcher
//!
//! We watch the parent **directories** rather than the files themselves because
//! editors usually save by writing a temp file and renaming it over the old one.
//!
//! The watcher only sends signals. Reading, validating and recompiling the
//! shader stays on the render thread.

use crossbeam_channel::{unbounded, Receiver};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotEvent {
    /// The fragment shader passed with `--shader` was saved.
    ShaderChanged(PathBuf),
    /// The settings file was rewritten (options page, another console, an editor).
    SettingsChanged(PathBuf),
}

pub struct HotReload {
    _watcher: RecommendedWatcher,
    rx: Receiver<HotEvent>,
}

/// Map a changed path onto the file it matters for, if any.
pub fn classify(changed: &Path, shader: Option<&Path>, settings: &Path) -> Option<HotEvent> {
    let same = |a: &Path, b: &Path| a.file_name().is_some() && a.file_name() == b.file_name();
    if let Some(s) = shader {
        if same(changed, s) {
            return Some(HotEvent::ShaderChanged(s.to_path_buf()));
        }
    }
    if same(changed, settings) {
        return Some(HotEvent::SettingsChanged(settings.to_path_buf()));
    }
    None
}

impl HotReload {
    pub fn rx(&self) -> &Receiver<HotEvent> {
        &self.rx
    }

    pub fn new(shader_path: Option<PathBuf>, settings_path: PathBuf) -> anyhow::Result<Self> {
        let (tx, rx) = unbounded::<HotEvent>();

        let shader = shader_path.clone();
        let settings = settings_path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(ev) = res {
                    for p in ev.paths {
                        if let Some(hot) = classify(&p, shader.as_deref(), &settings) {
                            let _ = tx.send(hot);
                        }
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(250)),
        )?;

        watch_parent(&mut watcher, &settings_path)?;
        if let Some(p) = &shader_path {
            if p.parent() != settings_path.parent() {
                watch_parent(&mut watcher, p)?;
            }
        }

        Ok(Self { _watcher: watcher, rx })
    }
}

fn watch_parent(w: &mut RecommendedWatcher, file: &Path) -> anyhow::Result<()> {
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    w.watch(&parent, RecursiveMode::NonRecursive)?;
    Ok(())
}
