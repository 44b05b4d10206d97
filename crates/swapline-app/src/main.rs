// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use swapline_core::{init_tracing, TracingSink};
use swapline_platform::{WindowHost, WindowSettings};
use swapline_render::{PresentConfig, PresentModePreference, DEFAULT_FRAMES_IN_FLIGHT};
use swapline_vk::{AshGpu, BootstrapOptions, Presenter, SharedGpu, TriangleDraw};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; a missing file means defaults
    #[arg(long, default_value = "swapline.toml")]
    config: PathBuf,

    /// Present mode preference: mailbox | fifo
    #[arg(long, value_enum)]
    present_mode: Option<PresentModeCfg>,

    #[arg(long)]
    frames_in_flight: Option<usize>,

    /// Force validation layers on
    #[arg(long, overrides_with = "no_validation")]
    validation: bool,

    /// Force validation layers off
    #[arg(long, overrides_with = "validation")]
    no_validation: bool,
}

impl Args {
    fn validation_override(&self) -> Option<bool> {
        match (self.validation, self.no_validation) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
enum PresentModeCfg {
    #[default]
    Mailbox,
    Fifo,
}

impl From<PresentModeCfg> for PresentModePreference {
    fn from(mode: PresentModeCfg) -> Self {
        match mode {
            PresentModeCfg::Mailbox => PresentModePreference::Mailbox,
            PresentModeCfg::Fifo => PresentModePreference::Fifo,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct RenderCfg {
    #[serde(default = "default_clear")]
    clear_color: [f32; 4],
    #[serde(default)]
    present_mode: PresentModeCfg,
    #[serde(default = "default_frames_in_flight")]
    frames_in_flight: usize,
    /// Unset waits forever.
    #[serde(default)]
    wait_timeout_ms: Option<u64>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::Mailbox,
            frames_in_flight: default_frames_in_flight(),
            wait_timeout_ms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct WindowCfg {
    #[serde(default = "default_title")]
    title: String,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct DebugCfg {
    /// Unset follows the `PROFILE` environment variable.
    #[serde(default)]
    validation: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct AppCfg {
    #[serde(default)]
    render: RenderCfg,
    #[serde(default)]
    window: WindowCfg,
    #[serde(default)]
    debug: DebugCfg,
}

fn default_clear() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}
fn default_frames_in_flight() -> usize {
    DEFAULT_FRAMES_IN_FLIGHT
}
fn default_title() -> String {
    "Vulkan".into()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}

impl AppCfg {
    fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// CLI flags win over the file.
    fn apply_args(mut self, args: &Args) -> Self {
        if let Some(mode) = args.present_mode {
            self.render.present_mode = mode;
        }
        if let Some(k) = args.frames_in_flight {
            self.render.frames_in_flight = k;
        }
        if let Some(on) = args.validation_override() {
            self.debug.validation = Some(on);
        }
        self
    }

    fn present_config(&self) -> PresentConfig {
        PresentConfig {
            frames_in_flight: self.render.frames_in_flight,
            clear_color: self.render.clear_color,
            present_mode: self.render.present_mode.into(),
            wait_timeout: self.render.wait_timeout_ms.map(Duration::from_millis),
        }
    }

    fn bootstrap_options(&self) -> BootstrapOptions {
        let mut options = BootstrapOptions::default();
        if let Some(on) = self.debug.validation {
            options.enable_validation = on;
        }
        options
    }

    fn window_settings(&self) -> WindowSettings {
        WindowSettings {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
        }
    }
}

fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(s) => AppCfg::parse(&s).with_context(|| format!("parse {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(AppCfg::default())
        }
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}

fn run(args: &Args) -> Result<()> {
    let cfg = load_cfg(&args.config)?.apply_args(args);
    let options = cfg.bootstrap_options();
    info!(
        validation = options.enable_validation,
        "present mode = {:?}, frames in flight = {}",
        cfg.render.present_mode,
        cfg.render.frames_in_flight
    );

    let mut host = WindowHost::open(cfg.window_settings()).context("open window")?;
    let gpu: SharedGpu = Arc::new(
        AshGpu::new(&host, &options, Arc::new(TracingSink)).context("Vulkan bootstrap")?,
    );
    let mut presenter = Presenter::new(
        gpu,
        &mut host,
        cfg.present_config(),
        Box::new(TriangleDraw),
    )
    .context("create presenter")?;
    presenter.run(&mut host).context("presentation loop")?;
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
