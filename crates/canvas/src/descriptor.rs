//! Defines the shader descriptor schema: the JSON document naming a fragment
//! shader and the texture inputs it samples.
//!
//! Types:
//!
//! - `ShaderDescriptor` captures the shader reference, the ordered texture
//!   index, and whether the live camera should be bound as `u_cam`.
//! - `TextureEntry` is internally tagged by `type`; the tag alone decides the
//!   loading strategy and which derived uniform keys get produced.
//!
//! Functions:
//!
//! - `ShaderDescriptor::validate` returns human-readable issues (duplicate or
//!   empty uniform names) so callers can warn without aborting.
use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ShaderDescriptor {
    pub shader_uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub textures_index: Vec<TextureEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub webcam: bool,
}

/// Treats an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TextureEntry {
    Array {
        #[serde(alias = "index_uri")]
        uri: String,
        uniform: String,
    },
    Image {
        uri: String,
        uniform: String,
    },
    Placeholder {
        uniform: String,
    },
}

impl TextureEntry {
    pub fn uniform(&self) -> &str {
        match self {
            Self::Array { uniform, .. }
            | Self::Image { uniform, .. }
            | Self::Placeholder { uniform } => uniform,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Array { uri, .. } | Self::Image { uri, .. } => Some(uri),
            Self::Placeholder { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Array { .. } => "array",
            Self::Image { .. } => "image",
            Self::Placeholder { .. } => "placeholder",
        }
    }

    /// Every uniform key this entry contributes once resolved.
    pub fn uniform_keys(&self) -> Vec<String> {
        let name = self.uniform();
        match self {
            Self::Array { .. } => vec![name.to_string(), depth_uniform(name)],
            Self::Image { .. } => vec![name.to_string(), correction_uniform(name)],
            Self::Placeholder { .. } => vec![name.to_string()],
        }
    }
}

pub fn depth_uniform(name: &str) -> String {
    format!("{name}_depth")
}

pub fn correction_uniform(name: &str) -> String {
    format!("{name}_corr")
}

impl ShaderDescriptor {
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.shader_uri.trim().is_empty() {
            issues.push("shader_uri must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for entry in &self.textures_index {
            if entry.uniform().trim().is_empty() {
                issues.push(format!("{} entry declares an empty uniform name", entry.kind()));
                continue;
            }
            for key in entry.uniform_keys() {
                if !seen.insert(key.clone()) {
                    issues.push(format!(
                        "uniform '{key}' is produced by more than one texture entry"
                    ));
                }
            }
        }
        issues
    }
}
