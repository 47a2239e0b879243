//! Host module hierarchy as an arena of scopes

use crate::dispatch::HookType;
use crate::op::OpType;
use crate::{Error, Result};
use std::cell::Cell;
use std::fmt;

/// Index of a scope inside its [`ModuleTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

impl ScopeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One instantiated sub-module
#[derive(Debug, Clone)]
pub struct ModuleScope {
    name: String,
    fqn: String,
    op_type: OpType,
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    hook_type: Cell<Option<HookType>>,
}

impl ModuleScope {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted path from the root; the root itself is `""`
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    pub fn op_type(&self) -> &OpType {
        &self.op_type
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn children(&self) -> &[ScopeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.op_type.is_leaf_module()
    }

    /// Hook classification cached by the dispatcher
    pub fn cached_hook_type(&self) -> Option<HookType> {
        self.hook_type.get()
    }

    pub(crate) fn cache_hook_type(&self, hook_type: HookType) {
        self.hook_type.set(Some(hook_type));
    }

    pub(crate) fn clear_hook_type(&self) {
        self.hook_type.set(None);
    }
}

/// Module hierarchy supplied by the host
#[derive(Debug, Clone)]
pub struct ModuleTree {
    scopes: Vec<ModuleScope>,
}

impl ModuleTree {
    /// Tree with a single root scope of class `root_type`
    pub fn new(root_type: impl Into<String>) -> Self {
        Self {
            scopes: vec![ModuleScope {
                name: String::new(),
                fqn: String::new(),
                op_type: OpType::module(root_type),
                parent: None,
                children: Vec::new(),
                hook_type: Cell::new(None),
            }],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Attach a named child scope. Leaf modules cannot have children.
    pub fn add_child(
        &mut self,
        parent: ScopeId,
        name: impl Into<String>,
        op_type: OpType,
    ) -> Result<ScopeId> {
        let name = name.into();
        let parent_scope = self.get(parent)?;
        if parent_scope.is_leaf() {
            return Err(Error::InvalidParameter(format!(
                "leaf module '{}' cannot own child '{name}'",
                parent_scope.fqn
            )));
        }
        if name.is_empty() || name.contains('.') {
            return Err(Error::InvalidParameter(format!(
                "invalid module name '{name}'"
            )));
        }
        let fqn = if parent_scope.fqn.is_empty() {
            name.clone()
        } else {
            format!("{}.{name}", parent_scope.fqn)
        };
        if self.find(&fqn).is_some() {
            return Err(Error::InvalidParameter(format!("duplicate module '{fqn}'")));
        }

        let id = ScopeId(self.scopes.len());
        self.scopes.push(ModuleScope {
            name,
            fqn,
            op_type,
            parent: Some(parent),
            children: Vec::new(),
            hook_type: Cell::new(None),
        });
        self.scopes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn get(&self, id: ScopeId) -> Result<&ModuleScope> {
        self.scopes
            .get(id.0)
            .ok_or_else(|| Error::InvalidState(format!("unknown scope {id}")))
    }

    pub fn find(&self, fqn: &str) -> Option<ScopeId> {
        self.scopes
            .iter()
            .position(|s| s.fqn == fqn)
            .map(ScopeId)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// All scopes in insertion order (parents before children)
    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &ModuleScope)> {
        self.scopes.iter().enumerate().map(|(i, s)| (ScopeId(i), s))
    }

    pub(crate) fn clear_hook_types(&self) {
        for scope in &self.scopes {
            scope.clear_hook_type();
        }
    }
}
