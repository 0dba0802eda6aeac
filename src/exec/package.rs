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

//! Package installation requests.

use serde::{Deserialize, Serialize};

use super::ShellCommand;
use crate::error::InputError;

/// Installer invoked for every package request.
const INSTALL_COMMAND: &str = "sudo apt-get install -y";

/// Packages to install: a whitespace separated string or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageSpec {
    Line(String),
    List(Vec<String>),
}

impl PackageSpec {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Line(line) => line.split_whitespace().collect(),
            Self::List(names) => names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }

    /// Build the install command, rejecting empty or unsafe names.
    pub fn to_command(&self) -> Result<ShellCommand, InputError> {
        let names = self.names();
        if names.is_empty() {
            return Err(InputError::EmptyPackages);
        }
        if let Some(bad) = names.iter().find(|name| !is_package_name(name)) {
            return Err(InputError::PackageName(bad.to_string()));
        }
        ShellCommand::new(format!("{INSTALL_COMMAND} {}", names.join(" ")))
    }
}

/// Debian package names, optionally with an architecture or version
/// qualifier (`libc6:amd64`, `nginx=1.24.0-1`).
fn is_package_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || "+-.:=~_".contains(c))
}

impl From<&str> for PackageSpec {
    fn from(line: &str) -> Self {
        Self::Line(line.to_string())
    }
}

impl From<String> for PackageSpec {
    fn from(line: String) -> Self {
        Self::Line(line)
    }
}

impl From<Vec<&str>> for PackageSpec {
    fn from(names: Vec<&str>) -> Self {
        Self::List(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for PackageSpec {
    fn from(names: Vec<String>) -> Self {
        Self::List(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_list_build_the_same_command() {
        let line = PackageSpec::from("nginx  curl").to_command().unwrap();
        let list = PackageSpec::from(vec!["nginx", "curl"]).to_command().unwrap();
        assert_eq!(line, list);
        assert_eq!(line.text(), "sudo apt-get install -y nginx curl");
    }

    #[test]
    fn test_qualified_names_are_accepted() {
        let spec = PackageSpec::from(vec!["libc6:amd64", "nginx=1.24.0-1", "g++"]);
        assert!(spec.to_command().is_ok());
    }

    #[test]
    fn test_empty_spec_is_rejected() {
        assert_eq!(
            PackageSpec::from("   ").to_command(),
            Err(InputError::EmptyPackages)
        );
        assert_eq!(
            PackageSpec::List(vec![]).to_command(),
            Err(InputError::EmptyPackages)
        );
    }

    #[test]
    fn test_shell_metacharacters_are_rejected() {
        assert_eq!(
            PackageSpec::from("nginx; rm -rf /").to_command(),
            Err(InputError::PackageName("nginx;".to_string()))
        );
        assert!(PackageSpec::from(vec!["$(id)"]).to_command().is_err());
    }

    #[test]
    fn test_deserialize_both_forms() {
        let line: PackageSpec = serde_json::from_str(r#""git vim""#).unwrap();
        assert_eq!(line.names(), vec!["git", "vim"]);
        let list: PackageSpec = serde_json::from_str(r#"["git", "vim"]"#).unwrap();
        assert_eq!(list.names(), vec!["git", "vim"]);
    }
}
