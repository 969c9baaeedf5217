//! Edit operations and the intents that select them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{PatchError, PatchResult};
use crate::config::PatchConfig;

pub const DEFAULT_FEATURE_NAME: &str = "auto_generated_feature";
pub const DEFAULT_FEATURE_BODY: &str = "print('AutoSync generated feature running')";

/// One text transformation applied to the sandbox copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    /// Substitute the version number in every version header.
    VersionHeader { version: String },
    /// Append a named block built from the configured header template.
    AppendBlock { name: String, body: String },
    /// Set a (dotted) key in a JSON object document.
    ConfigKey { key: String, value: Value },
    /// Replace every occurrence of `search`.
    Replace { search: String, replace: String },
}

impl EditOp {
    pub fn describe(&self) -> String {
        match self {
            EditOp::VersionHeader { version } => format!("version header updated to {version}"),
            EditOp::AppendBlock { name, .. } => format!("block {name} appended"),
            EditOp::ConfigKey { key, .. } => format!("config key {key} set"),
            EditOp::Replace { search, .. } => format!("text {search:?} replaced"),
        }
    }
}

/// What a patch request wants; each intent maps onto a set of edit ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent_type", rename_all = "snake_case")]
pub enum Intent {
    UpdateVersion {
        #[serde(default)]
        version: Option<String>,
    },
    CreateFeature {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    UpdateConfig { key: String, value: Value },
    ReplaceText { search: String, replace: String },
}

impl Intent {
    /// Edit ops for this intent. Empty means there is nothing to do.
    pub fn edits(&self) -> Vec<EditOp> {
        match self {
            Intent::UpdateVersion { version } => version
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| EditOp::VersionHeader { version: v.clone() })
                .collect(),
            Intent::CreateFeature { name, body } => vec![EditOp::AppendBlock {
                name: name.clone().unwrap_or_else(|| DEFAULT_FEATURE_NAME.to_string()),
                body: body.clone().unwrap_or_else(|| DEFAULT_FEATURE_BODY.to_string()),
            }],
            Intent::UpdateConfig { key, value } => vec![EditOp::ConfigKey {
                key: key.clone(),
                value: value.clone(),
            }],
            Intent::ReplaceText { search, replace } if !search.is_empty() => vec![EditOp::Replace {
                search: search.clone(),
                replace: replace.clone(),
            }],
            Intent::ReplaceText { .. } => Vec::new(),
        }
    }
}

/// Compiled edit settings.
#[derive(Debug, Clone)]
pub struct EditSettings {
    version_header: Regex,
    block_header: String,
    block_indent: String,
}

impl EditSettings {
    pub fn new(version_pattern: &str, block_header: &str, block_indent: &str) -> PatchResult<Self> {
        let version_header = Regex::new(version_pattern)?;
        // group 0 is the whole match
        let groups = version_header.captures_len() - 1;
        if groups < 2 {
            return Err(PatchError::PatternGroups(groups));
        }
        Ok(Self {
            version_header,
            block_header: block_header.to_string(),
            block_indent: block_indent.to_string(),
        })
    }

    pub fn from_config(config: &PatchConfig) -> PatchResult<Self> {
        Self::new(&config.version_pattern, &config.block_header, &config.block_indent)
    }

    fn apply_one(&self, text: &str, op: &EditOp) -> Result<String, String> {
        match op {
            EditOp::VersionHeader { version } => Ok(self
                .version_header
                .replace_all(text, |caps: &regex::Captures<'_>| format!("{}{}", &caps[1], version))
                .into_owned()),
            EditOp::AppendBlock { name, body } => {
                let header = self.block_header.replace("{name}", name);
                let lines: Vec<String> = body
                    .lines()
                    .map(|line| format!("{}{}", self.block_indent, line))
                    .collect();
                Ok(format!("{text}\n\n{header}\n{}", lines.join("\n")))
            }
            EditOp::ConfigKey { key, value } => set_config_key(text, key, value.clone()),
            EditOp::Replace { search, replace } => Ok(text.replace(search.as_str(), replace)),
        }
    }

    /// Apply `ops` in order; returns the new text and a description of every
    /// op that changed something.
    pub fn apply(&self, text: &str, ops: &[EditOp]) -> Result<(String, Vec<String>), String> {
        let mut current = text.to_string();
        let mut applied = Vec::new();
        for op in ops {
            let next = self.apply_one(&current, op)?;
            if next != current {
                applied.push(op.describe());
                current = next;
            }
        }
        Ok((current, applied))
    }
}

fn set_config_key(text: &str, key: &str, value: Value) -> Result<String, String> {
    let mut doc: Value =
        serde_json::from_str(text).map_err(|e| format!("config is not valid JSON: {e}"))?;
    let mut parts = key.split('.').peekable();
    let mut node = doc
        .as_object_mut()
        .ok_or_else(|| "config root is not an object".to_string())?;

    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            if node.get(part) == Some(&value) {
                return Ok(text.to_string());
            }
            node.insert(part.to_string(), value);
            break;
        }
        let child = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        node = child
            .as_object_mut()
            .ok_or_else(|| format!("config key {part} is not an object"))?;
    }

    let mut out = serde_json::to_string_pretty(&doc).map_err(|e| e.to_string())?;
    out.push('\n');
    Ok(out)
}
