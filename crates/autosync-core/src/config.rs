//! JSON configuration for an AutoSync base directory.
//!
//! The file lives at `config/autosync_config.json`. When absent a default is
//! written and used; a malformed file is an error. Every section is optional
//! and falls back to its `Default`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{AutosyncError, Result};
use crate::persist;

/// Config path relative to the base directory.
pub const CONFIG_RELATIVE_PATH: &str = "config/autosync_config.json";

/// Default dependency order used by the plan builder.
pub const DEFAULT_SERIAL_ORDER: [&str; 10] = [
    "AutoSync",
    "SafeGuard",
    "VersionDocs",
    "Scheduler",
    "OmegaEngine",
    "DeployBridge",
    "WebRack",
    "ImageInference",
    "MonitoringPanel",
    "LogCenter",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutosyncConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// The controller's own module; never executed by the pipeline.
    #[serde(default = "default_self_module")]
    pub self_module: String,
    #[serde(default = "default_serial_order")]
    pub serial_order: Vec<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Absent means no safety gate is configured (`NO_SAFEGUARD`).
    #[serde(default)]
    pub safeguard: Option<GateConfig>,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,
    #[serde(default)]
    pub patch: PatchConfig,
    #[serde(default)]
    pub healing: HealingConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    #[serde(default, rename = "loop")]
    pub loop_defaults: LoopConfig,
}

impl Default for AutosyncConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            description: "AutoSync default configuration".to_string(),
            self_module: default_self_module(),
            serial_order: default_serial_order(),
            paths: PathsConfig::default(),
            safeguard: Some(GateConfig::Builtin),
            modules: BTreeMap::new(),
            patch: PatchConfig::default(),
            healing: HealingConfig::default(),
            deploy: DeployConfig::default(),
            loop_defaults: LoopConfig::default(),
        }
    }
}

fn default_version() -> String {
    "4.1".to_string()
}

fn default_self_module() -> String {
    "AutoSync".to_string()
}

fn default_serial_order() -> Vec<String> {
    DEFAULT_SERIAL_ORDER.iter().map(|s| s.to_string()).collect()
}

/// Locations of persisted artifacts. Relative paths resolve against the base dir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub plan: PathBuf,
    pub status: PathBuf,
    pub state: PathBuf,
    pub loop_history: PathBuf,
    pub snapshot: PathBuf,
    pub logs: PathBuf,
    pub reports: PathBuf,
    pub backups: PathBuf,
    pub sandbox: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plan: PathBuf::from("plan/autosync_plan.json"),
            status: PathBuf::from("status/modules_status.json"),
            state: PathBuf::from("state/autosync_state.json"),
            loop_history: PathBuf::from("state/loop_history.jsonl"),
            snapshot: PathBuf::from("state/structure_snapshot.json"),
            logs: PathBuf::from("logs"),
            reports: PathBuf::from("reports"),
            backups: PathBuf::from("backups"),
            sandbox: PathBuf::from("sandbox"),
        }
    }
}

/// An external program invocation: `[interpreter] script args...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    pub script: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: None,
            script: script.into(),
            args: Vec::new(),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// How a module is patched, and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(flatten)]
    pub command: CommandSpec,
    /// Module directory, checked by the safety gate and used to tag guard results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Which safety gate to consult after patching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateConfig {
    /// In-process file and field checks.
    Builtin,
    /// External program in check mode: exit 0 is GREEN.
    Command {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interpreter: Option<String>,
        script: PathBuf,
        #[serde(default = "default_gate_args")]
        args: Vec<String>,
    },
}

fn default_gate_args() -> Vec<String> {
    vec!["--check".to_string()]
}

/// Patch-safety engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig {
    /// Allow-list of module name to target file. Anything else is skipped.
    pub targets: BTreeMap<String, PathBuf>,
    /// Regex with two groups: the header prefix and the version number.
    pub version_pattern: String,
    /// Header template for appended blocks; `{name}` is substituted.
    pub block_header: String,
    pub block_indent: String,
    /// Defaults to a python3 validator for `.py` targets. `null` disables it,
    /// which leaves every patch blocked with `NO_VALIDATOR`.
    pub validator: Option<ValidatorConfig>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            targets: BTreeMap::new(),
            version_pattern: r"(#\s*Version:\s*)(\d+\.\d+(?:\.\d+)?)".to_string(),
            block_header: "def {name}():".to_string(),
            block_indent: "    ".to_string(),
            validator: Some(ValidatorConfig::python()),
        }
    }
}

/// External syntax and simulate commands. `{path}` is replaced by the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// File extensions (without dot) this validator handles.
    pub extensions: Vec<String>,
    pub syntax: Vec<String>,
    pub simulate: Vec<String>,
}

impl ValidatorConfig {
    /// Parse with `ast` for syntax, then byte-compile as the simulation.
    pub fn python() -> Self {
        let argv = |parts: &[&str]| -> Vec<String> { parts.iter().map(|p| p.to_string()).collect() };
        Self {
            extensions: vec!["py".to_string()],
            syntax: argv(&[
                "python3",
                "-c",
                "import ast, sys; ast.parse(open(sys.argv[1]).read(), sys.argv[1])",
                "{path}",
            ]),
            simulate: argv(&["python3", "-m", "py_compile", "{path}"]),
        }
    }
}

/// One state file the self-healing layer keeps well-formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealTarget {
    pub path: PathBuf,
    pub defaults: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    pub files: Vec<HealTarget>,
}

impl Default for HealingConfig {
    fn default() -> Self {
        let object = |v: Value| match v {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            files: vec![
                HealTarget {
                    path: PathBuf::from("SafeGuard/SGD_state.json"),
                    defaults: object(json!({"autosync_risk": 0, "status": "GREEN"})),
                },
                HealTarget {
                    path: PathBuf::from("Scheduler/SCH_settings.json"),
                    defaults: object(json!({"enabled": true, "mode": "normal", "random_seed": 42})),
                },
            ],
        }
    }
}

/// One named deploy-chain stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(flatten)]
    pub command: CommandSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub stages: Vec<StageConfig>,
    /// Path components excluded from the structure snapshot.
    pub exclude: Vec<String>,
    /// Re-run the safety gate before the first stage.
    pub revalidate: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            exclude: ["logs", "state", "__pycache__", "backups", "sandbox", "reports"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            revalidate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub max_loops: u32,
    pub min_loops: u32,
    pub sleep_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_loops: 5,
            min_loops: 1,
            sleep_secs: 0,
        }
    }
}

impl AutosyncConfig {
    /// Load `path`, writing the default config first when it does not exist.
    ///
    /// Returns the config and whether it was freshly created.
    pub fn load_or_init(path: &Path) -> Result<(Self, bool)> {
        if !path.exists() {
            let config = Self::default();
            persist::write_json_atomic(path, &config)?;
            tracing::warn!(
                path = %path.display(),
                "config missing; wrote default configuration"
            );
            return Ok((config, true));
        }

        let raw = std::fs::read(path)?;
        let config = serde_json::from_slice(&raw).map_err(|e| AutosyncError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok((config, false))
    }
}
