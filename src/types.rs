//! Type-safe values exchanged with the stack lifecycle client.
//!
//! Capabilities and deploy results are proper enums instead of strings so
//! module code gets exhaustive matching and the CLI gets exact spellings.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Acknowledgements a stack deployment may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum Capability {
    #[strum(serialize = "CAPABILITY_IAM")]
    #[serde(rename = "CAPABILITY_IAM")]
    Iam,
    #[strum(serialize = "CAPABILITY_NAMED_IAM")]
    #[serde(rename = "CAPABILITY_NAMED_IAM")]
    NamedIam,
    #[strum(serialize = "CAPABILITY_AUTO_EXPAND")]
    #[serde(rename = "CAPABILITY_AUTO_EXPAND")]
    AutoExpand,
}

/// What a deploy-or-update call did on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeployStatus {
    /// The stack did not exist and was created
    Created,
    /// The stack existed and a change set was applied
    Updated,
    /// The stack existed and nothing changed
    Unchanged,
}

impl DeployStatus {
    /// Returns true if the remote side was modified
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}
