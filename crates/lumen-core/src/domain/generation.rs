//! Generator output and the scene-name parsing utility.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Scene used when the script declares no `Scene` subclass.
pub const DEFAULT_SCENE_NAME: &str = "ConceptAnimation";

static SCENE_CLASS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"class\s+(\w+)\(Scene\):").ok());

/// Explanation text plus an optional animation script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub explanation: String,
    pub script: Option<String>,
}

impl Generation {
    /// Blank scripts are treated as "no animation".
    pub fn new(explanation: impl Into<String>, script: Option<String>) -> Self {
        let script = script
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            explanation: explanation.into(),
            script,
        }
    }

    pub fn explanation_only(explanation: impl Into<String>) -> Self {
        Self::new(explanation, None)
    }
}

/// Name of the first declared scene class, or [`DEFAULT_SCENE_NAME`].
pub fn scene_name(script: &str) -> String {
    SCENE_CLASS
        .as_ref()
        .and_then(|re| re.captures(script))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_SCENE_NAME.to_string())
}

/// Does `script` declare a class called `scene`?
pub fn declares_scene(script: &str, scene: &str) -> bool {
    script
        .lines()
        .map(str::trim_start)
        .filter_map(|line| line.strip_prefix("class"))
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .any(|rest| {
            let name = rest.trim_start();
            name.strip_prefix(scene)
                .is_some_and(|tail| tail.starts_with('(') || tail.starts_with(':'))
        })
}
