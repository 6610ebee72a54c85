//! The linked application
//!
//! An [`AppSpec`] is produced once per successful link and never mutated
//! afterwards. All fields are plain data, so it is `Send + Sync` and can be
//! shared across threads behind an `Arc` without locking.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{
    Construct, ConstructKind, EntitySpec, LedgerSpec, QualifiedName, References, SurfaceSpec, TransactionSpec,
    WorkspaceSpec,
};
use crate::Result;

/// A construct together with the module that defines it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Linked<T> {
    pub module: String,
    pub node: T,
}

impl<T> Linked<T> {
    pub fn qualified_name(&self) -> QualifiedName
    where
        T: Named,
    {
        QualifiedName::new(self.module.clone(), self.node.node_name())
    }
}

/// Anything with a construct name
pub trait Named {
    fn node_name(&self) -> &str;
}

impl Named for Construct {
    fn node_name(&self) -> &str {
        self.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub name: String,
    pub files: Vec<String>,
    pub uses: Vec<String>,
}

/// Fully linked, immutable IR of one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    pub name: String,
    pub title: Option<String>,
    /// Sorted by module name
    pub modules: Vec<ModuleSummary>,
    /// Sorted by `(module, name)`; every reference carries its target
    pub constructs: Vec<Linked<Construct>>,
}

impl AppSpec {
    /// Look up any construct by qualified name
    pub fn get(&self, name: &QualifiedName) -> Option<&Construct> {
        self.constructs
            .binary_search_by(|c| (c.module.as_str(), c.node.name()).cmp(&(name.module.as_str(), name.name.as_str())))
            .ok()
            .map(|i| &self.constructs[i].node)
    }

    pub fn of_kind(&self, kind: ConstructKind) -> impl Iterator<Item = &Linked<Construct>> {
        self.constructs.iter().filter(move |c| c.node.kind() == kind)
    }

    pub fn entity(&self, name: &QualifiedName) -> Option<&EntitySpec> {
        match self.get(name) {
            Some(Construct::Entity(e)) => Some(e),
            _ => None,
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = (&str, &EntitySpec)> {
        self.constructs.iter().filter_map(|c| match &c.node {
            Construct::Entity(e) => Some((c.module.as_str(), e)),
            _ => None,
        })
    }

    pub fn surfaces(&self) -> impl Iterator<Item = (&str, &SurfaceSpec)> {
        self.constructs.iter().filter_map(|c| match &c.node {
            Construct::Surface(s) => Some((c.module.as_str(), s)),
            _ => None,
        })
    }

    pub fn workspaces(&self) -> impl Iterator<Item = (&str, &WorkspaceSpec)> {
        self.constructs.iter().filter_map(|c| match &c.node {
            Construct::Workspace(w) => Some((c.module.as_str(), w)),
            _ => None,
        })
    }

    pub fn ledgers(&self) -> impl Iterator<Item = (&str, &LedgerSpec)> {
        self.constructs.iter().filter_map(|c| match &c.node {
            Construct::Ledger(l) => Some((c.module.as_str(), l)),
            _ => None,
        })
    }

    pub fn transactions(&self) -> impl Iterator<Item = (&str, &TransactionSpec)> {
        self.constructs.iter().filter_map(|c| match &c.node {
            Construct::Transaction(t) => Some((c.module.as_str(), t)),
            _ => None,
        })
    }

    /// Every reference target that does not name a construct in this app.
    /// Empty for any `AppSpec` returned by the linker.
    pub fn dangling_references(&self) -> Vec<String> {
        let mut dangling = Vec::new();
        for linked in &self.constructs {
            let mut node = linked.node.clone();
            node.for_each_ref(&mut |r| match &r.target {
                Some(target) if self.get(target).map(|c| c.kind()) == Some(r.kind) => {}
                Some(target) => dangling.push(format!("{} -> {}", linked.node.name(), target)),
                None => dangling.push(format!("{} -> {} (unresolved)", linked.node.name(), r.name)),
            });
        }
        dangling
    }

    /// Canonical JSON form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Lowercase hex SHA-256 of the canonical JSON form
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{:x}", hasher.finalize())
    }
}

impl Hash for AppSpec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}
