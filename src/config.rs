use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::labels::LabelCatalog;
use crate::processor::PipelineSettings;
use crate::smoother::DEFAULT_ALPHA;
use crate::trajectory::DEFAULT_WINDOW_LEN;
use crate::voter::{ClassId, DEFAULT_HISTORY_LEN};

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    pub ema_alpha: f32,
    pub history_len: usize,
    pub window_len: usize,
    pub pointer_class: ClassId,
    pub neutral_motion_class: ClassId,
    pub motion_score_threshold: f32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            ema_alpha: DEFAULT_ALPHA,
            history_len: DEFAULT_HISTORY_LEN,
            window_len: DEFAULT_WINDOW_LEN,
            pointer_class: 2,
            neutral_motion_class: 0,
            motion_score_threshold: 0.5,
        }
    }
}

/// An external classifier and the names of its classes.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub command: Vec<String>,
    pub labels: Option<Vec<String>>,
    pub labels_path: Option<PathBuf>,
}

impl ModelSpec {
    /// Relative `labels_path` values resolve against `base_dir`.
    pub fn catalog(&self, base_dir: &Path) -> Result<LabelCatalog> {
        match (&self.labels, &self.labels_path) {
            (Some(labels), None) => Ok(LabelCatalog::new(labels.clone())),
            (None, Some(p)) => LabelCatalog::load(&base_dir.join(p)),
            _ => Err(anyhow!("exactly one of labels / labels_path must be set")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Models {
    pub pose: ModelSpec,
    pub motion: ModelSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub pipeline: Pipeline,
    pub models: Models,

    // Accept nested/dotted tables and flatten them into "a.b" -> "value"
    #[serde(default, deserialize_with = "deserialize_bindings_flat")]
    pub bindings: HashMap<String, String>,

    /// Action name -> keyboard shortcut, for `action:` bindings.
    #[serde(default)]
    pub shortcuts: HashMap<String, String>,

    /// Directory the profile was loaded from.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Profile {
    pub fn parse(txt: &str, base_dir: &Path) -> Result<Self> {
        let mut profile: Profile = toml::from_str(txt)?;
        profile.base_dir = base_dir.to_path_buf();
        validate_profile(&profile)?;
        Ok(profile)
    }

    /// Binding keys whose label is not a class of the bound model. These can
    /// never fire. Models whose labels cannot be loaded are skipped.
    pub fn unknown_binding_labels(&self) -> Vec<String> {
        let catalogs = [
            ("pose.", self.models.pose.catalog(&self.base_dir).ok()),
            ("motion.", self.models.motion.catalog(&self.base_dir).ok()),
        ];
        let mut out: Vec<String> = self
            .bindings
            .keys()
            .filter(|key| {
                catalogs.iter().any(|(prefix, catalog)| {
                    match (key.strip_prefix(*prefix), catalog) {
                        (Some(label), Some(c)) => c.position(label).is_none(),
                        _ => false,
                    }
                })
            })
            .cloned()
            .collect();
        out.sort();
        out
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            ema_alpha: self.pipeline.ema_alpha,
            history_len: self.pipeline.history_len,
            window_len: self.pipeline.window_len,
            pointer_class: self.pipeline.pointer_class,
            neutral_motion_class: self.pipeline.neutral_motion_class,
        }
    }
}

// --------- custom bindings deserializer (tolerant) ----------
fn deserialize_bindings_flat<'de, D>(
    de: D,
) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "bindings must be a table, got {:?}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    flatten_table("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn flatten_table(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<String, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Table(sub) => {
                flatten_table(&key, sub, out)?;
            }
            other => {
                return Err(format!(
                    "binding '{}' value must be a string, got {}",
                    key,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("could not determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("handctl"))
}

// profiles installed on first run
const BUNDLED_PROFILES: [(&str, &str); 2] = [
    ("default", include_str!("../profiles/default.toml")),
    ("ppt", include_str!("../profiles/ppt.toml")),
];

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_or_install_in(&config_dir()?)
    }

    pub fn load_or_install_in(cfgdir: &Path) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        for (name, text) in BUNDLED_PROFILES {
            let path = profdir.join(format!("{name}.toml"));
            if !path.exists() {
                fs::write(&path, text)?;
                info!("installed {name} profile at {}", path.display());
            }
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            fs::write(&active_ptr, b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile_file(&profdir.join(format!("{active_name}.toml")))?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir.to_path_buf(),
            profiles_dir: profdir,
            active_ptr,
        })
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    /// Re-read the active profile. On error the last good profile is kept.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile_file(&self.profile_path(&self.active_name))?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile_file(&p)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
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
}

pub fn load_profile_file(path: &Path) -> Result<Profile> {
    let txt = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    let profile = Profile::parse(&txt, base_dir)
        .map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
    for key in profile.unknown_binding_labels() {
        warn!(
            "{}: binding '{key}' names no known label and will never fire",
            path.display()
        );
    }
    Ok(profile)
}

fn validate_profile(p: &Profile) -> Result<()> {
    let pl = &p.pipeline;
    if !(0.0..=1.0).contains(&pl.ema_alpha) {
        return Err(anyhow!("pipeline.ema_alpha must be in [0,1]"));
    }
    if pl.history_len == 0 || pl.window_len == 0 {
        return Err(anyhow!("pipeline.history_len and window_len must be positive"));
    }
    if !(0.0..=1.0).contains(&pl.motion_score_threshold) {
        return Err(anyhow!("pipeline.motion_score_threshold must be in [0,1]"));
    }

    for (which, m) in [("pose", &p.models.pose), ("motion", &p.models.motion)] {
        if m.command.is_empty() || m.command[0].trim().is_empty() {
            return Err(anyhow!("models.{which}.command must not be empty"));
        }
        if m.labels.is_some() == m.labels_path.is_some() {
            return Err(anyhow!(
                "models.{which}: set exactly one of labels / labels_path"
            ));
        }
    }

    for (k, v) in &p.bindings {
        if k.trim().is_empty() {
            return Err(anyhow!("empty binding key"));
        }
        if !(k.starts_with("pose.") || k.starts_with("motion.")) {
            return Err(anyhow!(
                "binding '{}' must start with 'pose.' or 'motion.'",
                k
            ));
        }
        if v.trim().is_empty() {
            return Err(anyhow!("binding '{}' has empty action", k));
        }
        if !(v.starts_with("action:") || v.starts_with("key:")) {
            return Err(anyhow!("binding '{}' has invalid action '{}'", k, v));
        }
    }

    for (action, key) in &p.shortcuts {
        if action.trim().is_empty() || key.trim().is_empty() {
            return Err(anyhow!("shortcut '{action}' = '{key}' must name both sides"));
        }
    }
    Ok(())
}
