//! `videofilters`: desktop preview and shader checker for the VideoFilters engine.
//!
//! ```text
//! videofilters check <file.frag | settings.json>
//! videofilters preview [--settings <path>] [--shader <file.frag>] [--log-file <path>]
//! ```

mod console;
mod desktop;
mod hotreload;
mod preview;
mod validate;

use std::path::{Path, PathBuf};

use anyhow::Context;
use videofilters_engine::store::{load_json_result, read_to_string_result};
use videofilters_engine::validate::{emit_issues, emit_summary, ValidationIssue};
use videofilters_engine::{check_shader, loge, logi, logging, UniformSchema};

pub use preview::AppEvent;

const USAGE: &str = "\
usage:
  videofilters check <file.frag | settings.json>
  videofilters preview [--settings <path>] [--shader <file.frag>] [--log-file <path>]";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PreviewArgs {
    pub settings: Option<PathBuf>,
    pub shader: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
enum Cmd {
    Check(PathBuf),
    Preview(PreviewArgs),
    Help,
}

/// Parse argv (without the program name). `--log-file` is accepted anywhere.
fn parse_args(args: &[String]) -> anyhow::Result<(Cmd, Option<PathBuf>)> {
    let mut log_file = None;
    let mut rest = Vec::new();
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == "--log-file" {
            let p = it.next().context("--log-file needs a path")?;
            log_file = Some(PathBuf::from(p));
        } else {
            rest.push(a.as_str());
        }
    }

    let cmd = match rest.as_slice() {
        [] | ["preview"] => Cmd::Preview(PreviewArgs::default()),
        ["help" | "--help" | "-h"] => Cmd::Help,
        ["check", file] => Cmd::Check(PathBuf::from(file)),
        ["check", ..] => anyhow::bail!("check takes exactly one file"),
        ["preview", flags @ ..] => {
            let mut pa = PreviewArgs::default();
            let mut it = flags.iter();
            while let Some(f) = it.next() {
                match *f {
                    "--settings" => pa.settings = Some(PathBuf::from(it.next().context("--settings needs a path")?)),
                    "--shader" => pa.shader = Some(PathBuf::from(it.next().context("--shader needs a path")?)),
                    other => anyhow::bail!("unknown preview flag: {other}"),
                }
            }
            Cmd::Preview(pa)
        }
        [other, ..] => anyhow::bail!("unknown command: {other}"),
    };
    Ok((cmd, log_file))
}

fn check_shader_file(path: &Path) -> anyhow::Result<bool> {
    let src = read_to_string_result(path)?;
    let label = path.display().to_string();
    let report = check_shader(&src);
    let issues = report.to_issues(&label);
    emit_summary("SHADER", &label, &issues);
    emit_issues("SHADER", &issues);

    for spec in &UniformSchema::from_source(&src).uniforms {
        println!("{:<28} {:>8} .. {:<8} default {:<8} {}", spec.name, spec.min, spec.max, spec.default, spec.label);
    }
    Ok(report.is_valid())
}

fn check_settings_file(path: &Path) -> anyhow::Result<bool> {
    let doc: serde_json::Value = load_json_result(path)?;
    let issues = validate::validate_settings_json(&doc);
    emit_summary("CONFIG", &path.display().to_string(), &issues);
    emit_issues("CONFIG", &issues);
    Ok(!issues.iter().any(|i| i.level == videofilters_engine::validate::IssueLevel::Error))
}

/// Exit status 0 when the file is clean (warnings allowed), 1 otherwise.
fn run_check(path: &Path) -> i32 {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let result = if is_json { check_settings_file(path) } else { check_shader_file(path) };
    match result {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            loge!("CHECK", "{e:#}");
            1
        }
    }
}

pub fn log_issues(tag: &str, label: &str, issues: &[ValidationIssue]) {
    emit_summary(tag, label, issues);
    emit_issues(tag, issues);
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (cmd, mut log_file) = match parse_args(&args) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("videofilters: {e}\n{USAGE}");
            std::process::exit(2);
        }
    };
    if log_file.is_none() {
        if let Ok(p) = std::env::var("VIDEOFILTERS_LOG_FILE") {
            if !p.trim().is_empty() {
                log_file = Some(PathBuf::from(p));
            }
        }
    }

    let run_id = logging::init(log_file);
    logi!("INIT", "run_id={run_id}");

    let code = match cmd {
        Cmd::Help => {
            println!("{USAGE}");
            0
        }
        Cmd::Check(path) => run_check(&path),
        Cmd::Preview(pa) => match preview::run(pa) {
            Ok(()) => 0,
            Err(e) => {
                loge!("INIT", "{e:#}");
                1
            }
        },
    };
    std::process::exit(code);
}
