// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Declarative task files.
//!
//! ```yaml
//! settings:
//!   username: deploy
//!   persistent: false
//!
//! tasks:
//!   default:
//!     deps: [web]
//!   web:
//!     nodes: [web-1, web-2]
//!     steps:
//!       - connect
//!       - package: nginx curl
//!       - exec: systemctl restart nginx
//!       - save
//!       - disconnect
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::FleetSettings;
use crate::exec::PackageSpec;

/// File names searched for, in order, when no file is given.
pub const FLEETFILE_NAMES: &[&str] = &["Fleetfile.yaml", "Fleetfile.yml", "fleetfile.yaml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fleetfile {
    #[serde(default)]
    pub settings: FleetSettings,

    #[serde(default)]
    pub tasks: BTreeMap<String, TaskDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDef {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub deps: Vec<String>,

    /// Anything accepted as a node specification
    #[serde(default)]
    pub nodes: Option<Value>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One pipeline operator of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum Step {
    Connect,
    Disconnect,
    Save,
    Exec(String),
    Package(PackageSpec),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Save => "save",
            Self::Exec(_) => "exec",
            Self::Package(_) => "package",
        }
    }
}

/// `- connect` or `- exec: uptime`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Bare(String),
    Keyed(BTreeMap<String, Value>),
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        match raw {
            RawStep::Bare(name) => match name.as_str() {
                "connect" | "start" => Ok(Self::Connect),
                "disconnect" | "end" => Ok(Self::Disconnect),
                "save" => Ok(Self::Save),
                "exec" | "execute" | "package" => Err(format!("step '{name}' needs an argument")),
                other => Err(format!("unknown step '{other}'")),
            },
            RawStep::Keyed(map) => {
                let mut entries = map.into_iter();
                let (Some((key, value)), None) = (entries.next(), entries.next()) else {
                    return Err("a step must have exactly one key".to_string());
                };
                match key.as_str() {
                    "exec" | "execute" => match value {
                        Value::String(command) => Ok(Self::Exec(command)),
                        other => Err(format!("exec expects a command string, found {other}")),
                    },
                    "package" => serde_json::from_value(value)
                        .map(Self::Package)
                        .map_err(|e| format!("package expects a string or a list of names: {e}")),
                    other => Err(format!("unknown step '{other}'")),
                }
            }
        }
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        let keyed = |key: &str, value: Value| RawStep::Keyed(BTreeMap::from([(key.to_string(), value)]));
        match step {
            Step::Connect | Step::Disconnect | Step::Save => RawStep::Bare(step.name().to_string()),
            Step::Exec(command) => keyed("exec", Value::String(command)),
            Step::Package(spec) => keyed("package", serde_json::to_value(spec).unwrap_or(Value::Null)),
        }
    }
}

impl Fleetfile {
    /// Read and parse a fleetfile.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fleetfile at {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse YAML fleetfile at {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let fleetfile: Fleetfile = serde_yaml::from_str(content)?;
        for (name, task) in &fleetfile.tasks {
            for dep in &task.deps {
                if !fleetfile.tasks.contains_key(dep) {
                    anyhow::bail!("task '{name}' depends on unknown task '{dep}'");
                }
            }
        }
        Ok(fleetfile)
    }

    /// Find a fleetfile in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        FLEETFILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
settings:
  username: deploy
tasks:
  default:
    deps: [web]
  web:
    nodes: [web-1, {name: web-2, target: 10.0.0.2}]
    steps:
      - start
      - package: nginx curl
      - execute: uptime
      - save
      - end
"#;

    #[test]
    fn test_parse_sample() {
        let fleetfile = Fleetfile::parse(SAMPLE).unwrap();
        assert_eq!(fleetfile.settings.username.as_deref(), Some("deploy"));
        assert_eq!(fleetfile.tasks["default"].deps, vec!["web"]);

        let web = &fleetfile.tasks["web"];
        assert!(web.nodes.as_ref().unwrap().is_array());
        assert_eq!(
            web.steps,
            vec![
                Step::Connect,
                Step::Package(PackageSpec::Line("nginx curl".to_string())),
                Step::Exec("uptime".to_string()),
                Step::Save,
                Step::Disconnect,
            ]
        );
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        let err = Fleetfile::parse("tasks:\n  t:\n    steps: [reboot]\n").unwrap_err();
        assert!(format!("{err:#}").contains("reboot"));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let err = Fleetfile::parse("tasks:\n  a:\n    deps: [b]\n").unwrap_err();
        assert!(err.to_string().contains("unknown task 'b'"));
    }

    #[test]
    fn test_discover() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Fleetfile::discover(dir.path()).is_none());
        std::fs::write(dir.path().join("Fleetfile.yml"), "tasks: {}\n").unwrap();
        assert_eq!(
            Fleetfile::discover(dir.path()),
            Some(dir.path().join("Fleetfile.yml"))
        );
    }
}
