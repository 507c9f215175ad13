use std::collections::BTreeMap;

use fxhash::FxHashMap;

use crate::{expr::Value, source::SourceLoc};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ScopeId(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub enum ScopeKind {
    Global,
    Module(String),
    Proc,
    Macro(String),
    Loop,
    Iteration,
    /// Holds the back-tick labels between two ordinary labels.
    Temporary,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SymbolKind {
    Label,
    Constant,
    Variable,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub kind: SymbolKind,
    /// `None` while the defining expression waits for a fixup.
    pub value: Option<Value>,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    symbols: FxHashMap<String, Symbol>,
    modules: FxHashMap<String, ScopeId>,
    counter: Option<i64>,
}

/// Arena of nested scopes. Scopes outlive the blocks that opened them so
/// fixups can still resolve against them in the second pass.
pub struct Symtab {
    scopes: Vec<Scope>,
    hits: FxHashMap<String, SourceLoc>,
}

impl Symtab {
    #[inline]
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                parent: None,
                symbols: FxHashMap::default(),
                modules: FxHashMap::default(),
                counter: None,
            }],
            hits: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn open(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        if let ScopeKind::Module(name) = &kind {
            self.scopes[parent.0].modules.insert(name.clone(), id);
        }
        self.scopes.push(Scope {
            kind,
            parent: Some(parent),
            symbols: FxHashMap::default(),
            modules: FxHashMap::default(),
            counter: None,
        });
        id
    }

    #[inline]
    pub fn kind(&self, scope: ScopeId) -> &ScopeKind {
        &self.scopes[scope.0].kind
    }

    #[inline]
    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    #[inline]
    pub fn module(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        self.scopes[scope.0].modules.get(name).copied()
    }

    #[inline]
    pub fn set_counter(&mut self, scope: ScopeId, counter: i64) {
        self.scopes[scope.0].counter = Some(counter);
    }

    /// The counter of the innermost iteration around `scope`.
    pub fn loop_counter(&self, scope: ScopeId) -> Option<i64> {
        self.chain(scope)
            .find_map(|id| self.scopes[id.0].counter)
    }

    /// The nearest scope that is not a temporary label zone.
    pub fn owner(&self, scope: ScopeId) -> ScopeId {
        self.chain(scope)
            .find(|id| self.scopes[id.0].kind != ScopeKind::Temporary)
            .unwrap_or(ScopeId(0))
    }

    #[inline]
    pub fn get_local(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        self.scopes[scope.0].symbols.get(name)
    }

    #[inline]
    pub fn get_local_mut(&mut self, scope: ScopeId, name: &str) -> Option<&mut Symbol> {
        self.scopes[scope.0].symbols.get_mut(name)
    }

    #[inline]
    pub fn insert(&mut self, scope: ScopeId, name: String, symbol: Symbol) -> Option<Symbol> {
        self.scopes[scope.0].symbols.insert(name, symbol)
    }

    /// Resolves `name` as seen from `scope`. Unqualified names walk outward
    /// through the enclosing scopes; `Module.Name` descends into modules.
    pub fn resolve(&self, scope: ScopeId, name: &str, root: bool) -> Option<&Symbol> {
        let start = if root { self.root() } else { scope };
        if root {
            if let Some(symbol) = self.get_local(start, name) {
                return Some(symbol);
            }
        } else if let Some(symbol) = self
            .chain(start)
            .find_map(|id| self.scopes[id.0].symbols.get(name))
        {
            return Some(symbol);
        }

        let (head, rest) = name.split_once('.')?;
        let mut module = if root {
            self.module(start, head)?
        } else {
            self.chain(start).find_map(|id| self.module(id, head))?
        };
        let mut rest = rest;
        loop {
            if let Some(symbol) = self.get_local(module, rest) {
                return Some(symbol);
            }
            let (head, tail) = rest.split_once('.')?;
            module = self.module(module, head)?;
            rest = tail;
        }
    }

    /// The scope holding the variable `name`, searching from `scope` outward.
    pub fn find_variable(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        self.chain(scope).find(|id| {
            matches!(
                self.scopes[id.0].symbols.get(name),
                Some(Symbol {
                    kind: SymbolKind::Variable,
                    ..
                })
            )
        })
    }

    #[inline]
    pub fn touch(&mut self, name: &str, loc: SourceLoc) {
        if !self.hits.contains_key(name) {
            self.hits.insert(name.to_string(), loc);
        }
    }

    #[inline]
    pub fn first_reference(&self, name: &str) -> Option<&SourceLoc> {
        self.hits.get(name)
    }

    /// Resolved labels and constants of the global scope and of every module,
    /// the latter qualified with their module path.
    pub fn exported(&self) -> BTreeMap<String, i64> {
        let mut symbols = BTreeMap::new();
        self.export_scope(self.root(), "", &mut symbols);
        symbols
    }

    fn export_scope(&self, scope: ScopeId, prefix: &str, symbols: &mut BTreeMap<String, i64>) {
        let scope = &self.scopes[scope.0];
        for (name, symbol) in &scope.symbols {
            if symbol.kind == SymbolKind::Variable || name.starts_with('`') {
                continue;
            }
            if let Some(value) = symbol.value.as_ref().and_then(Value::as_int) {
                symbols.insert(format!("{prefix}{name}"), value);
            }
        }
        for (name, module) in &scope.modules {
            self.export_scope(*module, &format!("{prefix}{name}."), symbols);
        }
    }

    fn chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), move |id| self.scopes[id.0].parent)
    }
}

impl Default for Symtab {
    fn default() -> Self {
        Self::new()
    }
}
