use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::input;
use crate::pull::PULL_THRESHOLD;
use crate::refresh::{CommandRefresh, NoopRefresh, RefreshAction};
use crate::viewport::{FormFactor, FormFactorWatch, MOBILE_BREAKPOINT, Viewport};

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    #[serde(default)]
    pub allow_commands: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullSection {
    #[serde(default = "default_threshold")]
    pub threshold_px: f32,
}

impl Default for PullSection {
    fn default() -> Self {
        Self {
            threshold_px: PULL_THRESHOLD,
        }
    }
}

fn default_threshold() -> f32 {
    PULL_THRESHOLD
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FormFactorMode {
    #[default]
    Auto,
    Mobile,
    Desktop,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportSection {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_breakpoint")]
    pub mobile_breakpoint: u32,
    #[serde(default)]
    pub form_factor: FormFactorMode,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            width: 390,
            height: 844,
            mobile_breakpoint: MOBILE_BREAKPOINT,
            form_factor: FormFactorMode::Auto,
        }
    }
}

fn default_breakpoint() -> u32 {
    MOBILE_BREAKPOINT
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSection {
    pub y_raw_min: i32,
    pub y_raw_max: i32,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            y_raw_min: 0,
            y_raw_max: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RefreshSection {
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub pull: PullSection,
    #[serde(default)]
    pub viewport: ViewportSection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub refresh: RefreshSection,
}

impl Profile {
    pub fn parse(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.viewport.width,
            height: self.viewport.height,
        }
    }

    pub fn form_factor(&self) -> FormFactorWatch {
        match self.viewport.form_factor {
            FormFactorMode::Auto => {
                FormFactorWatch::auto(self.viewport(), self.viewport.mobile_breakpoint)
            }
            FormFactorMode::Mobile => FormFactorWatch::fixed(FormFactor::Mobile),
            FormFactorMode::Desktop => FormFactorWatch::fixed(FormFactor::Desktop),
        }
    }

    pub fn refresh_action(&self) -> Arc<dyn RefreshAction> {
        let cmd = self.refresh.command.trim();
        if cmd.is_empty() {
            Arc::new(NoopRefresh)
        } else {
            Arc::new(CommandRefresh::new(cmd, self.meta.allow_commands))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("pullctl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_from(config_dir()?)
    }

    pub fn load_from(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)
            .with_context(|| format!("failed to create {}", profdir.display()))?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            fs::write(&active_ptr, b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Loads `name` without changing the active pointer.
    pub fn with_profile(mut self, name: &str) -> Result<Self> {
        self.profile = load_profile(&self.profiles_dir, name)?;
        self.active_name = name.to_string();
        Ok(self)
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        self.profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config_dir.join("settings.toml")
    }
}

pub fn doctor_report(st: &ConfigState) -> serde_json::Value {
    let devices = input::discover_touchscreens();
    let event_nodes = fs::read_dir("/dev/input")
        .map(|rd| {
            rd.flatten()
                .filter(|e| e.file_name().to_string_lossy().starts_with("event"))
                .count()
        })
        .unwrap_or(0);
    let p = &st.profile;
    serde_json::json!({
        "input_group_member": check_in_input_group(),
        "event_nodes": event_nodes,
        "touchscreens": devices,
        "profiles_dir": st.profiles_dir,
        "active_profile": st.active_name,
        "threshold_px": p.pull.threshold_px,
        "form_factor": format!("{:?}", p.form_factor().current()),
        "refresh_action": p.refresh_action().describe(),
        "hints": {
            "no_touchscreens": "readable /dev/input/event* nodes are required; check group membership",
            "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
        }
    })
}

fn check_in_input_group() -> bool {
    let Ok(s) = fs::read_to_string("/etc/group") else {
        return false;
    };
    let user = whoami::username();
    s.lines()
        .filter(|line| line.starts_with("input:"))
        .any(|line| line.split(':').nth(3).unwrap_or("").split(',').any(|u| u == user))
}

fn load_profile(profiles_dir: &Path, name: &str) -> Result<Profile> {
    let path = profiles_dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::parse(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
}

fn validate_profile(p: &Profile) -> Result<()> {
    if !(p.pull.threshold_px.is_finite() && p.pull.threshold_px > 0.0) {
        return Err(anyhow!("pull.threshold_px must be a positive number of pixels"));
    }
    if p.viewport.width == 0 || p.viewport.height == 0 {
        return Err(anyhow!("viewport width and height must be positive"));
    }
    if p.device.y_raw_max <= p.device.y_raw_min {
        return Err(anyhow!("device.y_raw_max must be greater than device.y_raw_min"));
    }
    if !p.refresh.command.trim().is_empty() && !p.meta.allow_commands {
        return Err(anyhow!(
            "refresh.command is set but meta.allow_commands=false"
        ));
    }
    Ok(())
}
