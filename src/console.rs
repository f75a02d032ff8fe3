//! Line-oriented stand-in for the browser popup.
//!
//! Runs on its own thread and talks to the page contexts only through a
//! [`ChannelTransport`], exactly like the extension popup talks to content
//! scripts.

use std::io::BufRead;
use std::path::PathBuf;
use std::thread::JoinHandle;

use videofilters_engine::filter::FilterField;
use videofilters_engine::messaging::ChannelTransport;
use videofilters_engine::popup::{Popup, VideoPanel};
use videofilters_engine::store::JsonFileStore;
use videofilters_engine::{loge, logi, logw};
use winit::event_loop::EventLoopProxy;

use crate::AppEvent;

pub const HELP: &str = "\
commands:
  list                      refresh and show every video
  video <n>                 select video n (1-based)
  shader                    toggle the shader on the selected video
  set <uniform> <value>     move a uniform slider
  reset <uniform>           uniform back to its default
  filter <name> <value>     e.g. filter hue-rotate 90
  unfilter <name>           filter back to neutral
  rate <value>              playback rate
  preset <name>             apply a preset
  save <name>               save the current values as a preset
  delete                    delete the selected preset
  pip                       toggle picture-in-picture
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Video(usize),
    Shader,
    Set(String, f64),
    Reset(String),
    Filter(FilterField, f64),
    Unfilter(FilterField),
    Rate(f64),
    Preset(String),
    Save(String),
    Delete,
    Pip,
    Help,
    Quit,
}

fn number(s: Option<&str>) -> Result<f64, String> {
    let s = s.ok_or("missing value")?;
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("not a number: {s}"))
}

fn field(s: Option<&str>) -> Result<FilterField, String> {
    let s = s.ok_or("missing filter name")?;
    FilterField::from_name(s).ok_or_else(|| format!("unknown filter: {s}"))
}

fn word(s: Option<&str>, what: &str) -> Result<String, String> {
    s.map(str::to_string).ok_or_else(|| format!("missing {what}"))
}

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut it = line.split_whitespace();
    let Some(head) = it.next() else { return Ok(None) };
    let cmd = match head {
        "list" | "ls" => Command::List,
        "video" => {
            let n = word(it.next(), "video number")?;
            match n.parse::<usize>() {
                Ok(n) if n > 0 => Command::Video(n - 1),
                _ => return Err(format!("bad video number: {n}")),
            }
        }
        "shader" => Command::Shader,
        "set" => {
            let name = word(it.next(), "uniform name")?;
            Command::Set(name, number(it.next())?)
        }
        "reset" => Command::Reset(word(it.next(), "uniform name")?),
        "filter" => {
            let f = field(it.next())?;
            Command::Filter(f, number(it.next())?)
        }
        "unfilter" => Command::Unfilter(field(it.next())?),
        "rate" => Command::Rate(number(it.next())?),
        // preset names may contain spaces
        "preset" | "save" => {
            let name = line.trim_start()[head.len()..].trim().to_string();
            if name.is_empty() {
                return Err("missing preset name".into());
            }
            if head == "preset" {
                Command::Preset(name)
            } else {
                Command::Save(name)
            }
        }
        "delete" => Command::Delete,
        "pip" => Command::Pip,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Some(cmd))
}

pub fn describe(n: usize, p: &VideoPanel) -> String {
    let mut out = format!(
        "[{}] {} ({} #{}) rate {} preset {}\n",
        n + 1,
        p.label,
        p.key.uri,
        p.key.index,
        p.rate_readout(),
        p.preset.as_deref().unwrap_or("-"),
    );
    let filters: Vec<String> = FilterField::ALL
        .into_iter()
        .map(|f| format!("{} {}", f.css_name(), p.filter_readout(f)))
        .collect();
    out.push_str(&format!("    filter: {}\n", filters.join(", ")));
    let state = if p.shader.is_active() { "on" } else { "off" };
    out.push_str(&format!("    shader: {state}"));
    for c in p.shader.controls() {
        out.push_str(&format!("\n      {:<12} {:>6}  [{}, {}]", c.label(), c.readout(), c.spec.min, c.spec.max));
    }
    out
}

struct Console {
    popup: Popup<ChannelTransport, JsonFileStore>,
    selected: usize,
}

impl Console {
    fn list(&mut self) {
        self.popup.refresh();
        if self.popup.panels().is_empty() {
            println!("no videos");
        }
        for (n, p) in self.popup.panels().iter().enumerate() {
            println!("{}", describe(n, p));
        }
        if self.selected >= self.popup.panels().len() {
            self.selected = 0;
        }
    }

    /// Returns false on quit.
    fn run(&mut self, cmd: Command) -> bool {
        let i = self.selected;
        match cmd {
            Command::List => self.list(),
            Command::Video(n) => {
                if n < self.popup.panels().len() {
                    self.selected = n;
                } else {
                    println!("no video {}", n + 1);
                }
            }
            Command::Shader => {
                let on = self.popup.toggle_shader(i);
                println!("shader {}", if on { "on" } else { "off" });
            }
            Command::Set(name, v) => match self.popup.uniform_input(i, &name, v) {
                Some(v) => println!("{name} = {v:.1}"),
                None => println!("{name}: no live control (is the shader on?)"),
            },
            Command::Reset(name) => match self.popup.uniform_reset(i, &name) {
                Some(v) => println!("{name} = {v:.1}"),
                None => println!("{name}: nothing to reset"),
            },
            Command::Filter(f, v) => {
                if self.popup.set_filter(i, f, v) {
                    if let Some(p) = self.popup.panel(i) {
                        println!("{} {}", f.css_name(), p.filter_readout(f));
                    }
                } else {
                    println!("{} is locked", f.css_name());
                }
            }
            Command::Unfilter(f) => {
                self.popup.reset_filter(i, f);
            }
            Command::Rate(v) => {
                if self.popup.set_playback_rate(i, v) {
                    if let Some(p) = self.popup.panel(i) {
                        println!("rate {}", p.rate_readout());
                    }
                }
            }
            Command::Preset(name) => self.popup.select_preset(i, &name),
            Command::Save(name) => {
                if !self.popup.save_preset(i, &name) {
                    println!("could not save preset '{name}'");
                }
            }
            Command::Delete => {
                if !self.popup.delete_preset(i) {
                    println!("nothing deleted");
                }
            }
            Command::Pip => {
                if !self.popup.toggle_pip(i) {
                    println!("picture-in-picture unavailable");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
        }
        true
    }
}

/// Spawn the console thread. It opens the popup, starts the shader on the
/// largest video and then reads commands from stdin until `quit` or EOF.
pub fn spawn(
    transport: ChannelTransport,
    settings_path: PathBuf,
    proxy: EventLoopProxy<AppEvent>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("console".into()).spawn(move || {
        let popup = match Popup::open(transport, JsonFileStore::new(&settings_path)) {
            Ok(p) => p,
            Err(e) => {
                loge!("CONSOLE", "could not open popup: {e}");
                let _ = proxy.send_event(AppEvent::Quit);
                return;
            }
        };
        let mut console = Console { popup, selected: 0 };
        console.list();
        if !console.popup.panels().is_empty() && !console.popup.panels()[0].shader.is_active() {
            console.run(Command::Shader);
        }
        println!("{HELP}");

        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    logw!("CONSOLE", "stdin: {e}");
                    break;
                }
            };
            match parse(&line) {
                Ok(Some(cmd)) => {
                    if !console.run(cmd) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{e}"),
            }
        }

        console.popup.close();
        logi!("CONSOLE", "closed");
        let _ = proxy.send_event(AppEvent::Quit);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("video 2"), Ok(Some(Command::Video(1))));
        assert_eq!(parse("set u_vignette 0.5"), Ok(Some(Command::Set("u_vignette".into(), 0.5))));
        assert_eq!(parse("filter hue-rotate 90"), Ok(Some(Command::Filter(FilterField::HueRotate, 90.0))));
        assert_eq!(parse("filter hueRotate 90"), Ok(Some(Command::Filter(FilterField::HueRotate, 90.0))));
        assert_eq!(parse("save  Late night "), Ok(Some(Command::Save("Late night".into()))));
        assert_eq!(parse("q"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse("video 0").is_err());
        assert!(parse("set u_x").is_err());
        assert!(parse("set u_x NaN").is_err());
        assert!(parse("filter glow 1").is_err());
        assert!(parse("preset").is_err());
        assert!(parse("dance").is_err());
    }
}
