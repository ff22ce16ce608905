//! Module descriptors and the module registry.
//!
//! A module is an installable/removable unit of infrastructure. Every module
//! implements [`InstallModule`]; the [`Registry`] is the fixed, ordered set of
//! modules known to a run. Registration order matters: it is the tie-break the
//! resolver uses between modules with no ordering constraint.
//!
//! Modules are immutable once registered. All per-run data lives in
//! [`Answers`], which is handed to every planning call.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use crate::answers::Answers;
use crate::engine::task::Task;
use crate::error::{InstallerError, Result};

/// Top-level `Answers` keys that cannot be used as module names.
pub const RESERVED_NAMES: &[&str] = &["environment", "region", "modules"];

/// Unique module identity, e.g. `deploymentHelper`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Borrow<str> for ModuleName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModuleName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Static metadata shared by every module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Unique name, also the module's `Answers` namespace key
    pub name: ModuleName,
    /// Human label for listings and logs
    pub friendly_name: String,
    /// Modules that must be installed before (and deleted after) this one
    pub mandatory: Vec<ModuleName>,
    /// Modules honored for ordering only when they are also selected
    pub optional: Vec<ModuleName>,
}

impl ModuleInfo {
    pub fn new(name: impl Into<ModuleName>, friendly_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            friendly_name: friendly_name.into(),
            mandatory: Vec::new(),
            optional: Vec::new(),
        }
    }

    pub fn mandatory<I, N>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<ModuleName>,
    {
        self.mandatory.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn optional<I, N>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<ModuleName>,
    {
        self.optional.extend(deps.into_iter().map(Into::into));
        self
    }
}

/// The capability set every module provides.
///
/// # Contract
///
/// - `plan_install` / `plan_delete` are pure: they inspect `Answers` and
///   return tasks, never performing side effects themselves.
/// - Tasks may only write into the module's own namespace. This is enforced
///   by [`crate::engine::task::TaskContext`], which is the only handle an
///   action receives.
/// - `validate` runs once per module, right before `plan_install`, and is the
///   single place preconditions are checked.
pub trait InstallModule {
    /// Identity and dependency declarations.
    fn info(&self) -> &ModuleInfo;

    /// Check the answers this module needs before any of its tasks are built.
    fn validate(&self, _answers: &Answers) -> Result<()> {
        Ok(())
    }

    /// Tasks that install (or refresh) this module.
    fn plan_install(&self, answers: &Answers) -> Vec<Task>;

    /// Tasks that remove this module.
    fn plan_delete(&self, answers: &Answers) -> Vec<Task>;

    fn name(&self) -> &ModuleName {
        &self.info().name
    }
}

/// Ordered collection of every module known to a run.
#[derive(Default)]
pub struct Registry {
    modules: Vec<Box<dyn InstallModule>>,
    index: HashMap<ModuleName, usize>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Declaration order is preserved.
    pub fn register(&mut self, module: Box<dyn InstallModule>) -> Result<()> {
        let name = module.name().clone();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(InstallerError::configuration(
                &name,
                "module name collides with a reserved answers key",
            ));
        }
        if self.index.contains_key(&name) {
            return Err(InstallerError::DuplicateModule(name));
        }
        self.index.insert(name, self.modules.len());
        self.modules.push(module);
        Ok(())
    }

    /// Builder-style registration
    pub fn with(mut self, module: impl InstallModule + 'static) -> Result<Self> {
        self.register(Box::new(module))?;
        Ok(self)
    }

    /// Look up a module by name
    pub fn get(&self, name: &str) -> Option<&dyn InstallModule> {
        self.index.get(name).map(|&i| self.modules[i].as_ref())
    }

    /// Declaration index of a module
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &dyn InstallModule> {
        self.modules.iter().map(|m| m.as_ref())
    }

    /// Module names in declaration order
    pub fn names(&self) -> Vec<ModuleName> {
        self.iter().map(|m| m.name().clone()).collect()
    }

    /// Check that every mandatory dependency names a registered module.
    ///
    /// Optional dependencies on unregistered modules are ignored.
    pub fn check_dependencies(&self) -> Result<()> {
        for module in self.iter() {
            for dep in &module.info().mandatory {
                if !self.contains(dep.as_str()) {
                    return Err(InstallerError::UnknownDependency {
                        module: module.name().clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
