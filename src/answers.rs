//! Configuration state threaded through a run.
//!
//! `Answers` holds the run-wide scalars (environment, region, selected modules)
//! plus one free-form namespace per module. It is persisted as JSON with the
//! namespaces flattened to top-level keys:
//!
//! ```json
//! {
//!   "environment": "dev",
//!   "region": "us-west-2",
//!   "modules": ["vpc", "deploymentHelper"],
//!   "s3": { "bucket": "my-artifacts" },
//!   "vpc": { "id": "vpc-0abc" }
//! }
//! ```
//!
//! Any code may read any namespace. Writing is split: callers seeding initial
//! answers use [`Answers::seed`]; task actions can only reach their own
//! namespace through [`crate::engine::task::TaskContext`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::InstallerError;
use crate::module::ModuleName;

/// Key under which deploy fingerprints are recorded inside a namespace.
const STACKS_KEY: &str = "stacks";

/// One module's free-form record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(Map<String, Value>);

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for `key`. Empty strings count as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fingerprint recorded by the last successful deploy of `stack`.
    pub fn stack_fingerprint(&self, stack: &str) -> Option<&str> {
        self.0
            .get(STACKS_KEY)
            .and_then(|v| v.get(stack))
            .and_then(Value::as_str)
    }

    pub fn record_stack(&mut self, stack: &str, fingerprint: impl Into<String>) {
        let entry = self
            .0
            .entry(STACKS_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(stacks) = entry {
            stacks.insert(stack.to_string(), Value::String(fingerprint.into()));
        }
    }

    pub fn forget_stack(&mut self, stack: &str) {
        let now_empty = match self.0.get_mut(STACKS_KEY) {
            Some(Value::Object(stacks)) => {
                stacks.remove(stack);
                stacks.is_empty()
            }
            _ => false,
        };
        if now_empty {
            self.0.remove(STACKS_KEY);
        }
    }
}

/// The configuration state for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Answers {
    /// Target environment, used in every stack name
    pub environment: String,

    /// Target region
    pub region: String,

    /// Modules selected for this run
    #[serde(default)]
    pub modules: Vec<ModuleName>,

    #[serde(flatten)]
    namespaces: BTreeMap<ModuleName, Namespace>,
}

impl Answers {
    pub fn new(environment: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            region: region.into(),
            ..Self::default()
        }
    }

    /// Read-only view of a module's namespace
    pub fn namespace(&self, module: &str) -> Option<&Namespace> {
        self.namespaces.get(module)
    }

    /// Shorthand for reading one string value
    pub fn get_str(&self, module: &str, key: &str) -> Option<&str> {
        self.namespace(module).and_then(|ns| ns.get_str(key))
    }

    pub fn get(&self, module: &str, key: &str) -> Option<&Value> {
        self.namespace(module).and_then(|ns| ns.get(key))
    }

    /// Seed a value before a run, the way interactive prompts or a saved
    /// answers file would.
    pub fn seed(&mut self, module: &str, key: impl Into<String>, value: impl Into<Value>) {
        self.namespace_mut(&ModuleName::from(module)).set(key, value);
    }

    /// Builder-style [`Answers::seed`]
    pub fn with(mut self, module: &str, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.seed(module, key, value);
        self
    }

    /// Mutable namespace access, restricted to the engine.
    pub(crate) fn namespace_mut(&mut self, module: &ModuleName) -> &mut Namespace {
        self.namespaces.entry(module.clone()).or_default()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&ModuleName, &Namespace)> {
        self.namespaces.iter()
    }

    /// Validate the run-wide scalars.
    pub fn validate(&self) -> std::result::Result<(), InstallerError> {
        let env = self.environment.trim();
        if env.is_empty() {
            return Err(InstallerError::answers("environment must be specified"));
        }
        if !env.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(InstallerError::answers(format!(
                "environment '{}' may only contain letters, digits and hyphens",
                env
            )));
        }
        if env.starts_with('-') || env.ends_with('-') {
            return Err(InstallerError::answers(format!(
                "environment '{}' must not start or end with a hyphen",
                env
            )));
        }

        let region = self.region.trim();
        if region.is_empty() {
            return Err(InstallerError::answers("region must be specified"));
        }
        let well_formed = region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && region.split('-').filter(|part| !part.is_empty()).count() >= 3;
        if !well_formed {
            return Err(InstallerError::answers(format!(
                "region '{}' is not of the form 'us-west-2'",
                region
            )));
        }

        Ok(())
    }

    /// Save answers to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize answers to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write answers to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load answers from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read answers from {:?}", path.as_ref()))?;

        let answers: Self =
            serde_json::from_str(&content).context("Failed to parse answers JSON")?;

        Ok(answers)
    }
}
