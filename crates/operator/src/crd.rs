use std::collections::BTreeMap;
use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MinecraftMode {
    Survival,
    Creative,
    Hardcore,
}

impl MinecraftMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Survival => "survival",
            Self::Creative => "creative",
            Self::Hardcore => "hardcore",
        }
    }
}

impl fmt::Display for MinecraftMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MinecraftDifficulty {
    Easy,
    Normal,
    Hard,
    Peaceful,
}

impl MinecraftDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
            Self::Peaceful => "peaceful",
        }
    }
}

impl fmt::Display for MinecraftDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
pub struct MinecraftPorts {
    #[serde(default)]
    pub minecraft: Option<u16>,
}

/// Metadata stamped onto every pod the operator creates for this resource.
#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
pub struct ChildTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Desired state of a managed Minecraft server. Every field is independently
/// optional; an absent field means "use the server image default", not the
/// zero value.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
#[kube(group = "minecraft.schidlow.ski", version = "v1", kind = "Minecraft", namespaced, status = "MinecraftStatus")]
pub struct MinecraftSpec {
    #[serde(default)]
    pub mode: Option<MinecraftMode>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub motd: Option<String>,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub difficulty: Option<MinecraftDifficulty>,
    #[serde(default)]
    pub ports: Option<MinecraftPorts>,
    #[serde(default)]
    pub template: ChildTemplate,
}

/// Written only by the reconciler, once per pass. `pod` and `mode` serialize
/// as null when cleared so a merge patch on the status subresource drops them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
pub struct MinecraftStatus {
    pub mode: Option<MinecraftMode>,
    pub status: String,
    pub pod: Option<String>,
}
