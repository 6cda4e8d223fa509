//! Lexical scopes stored in an indexed arena.
//!
//! A scope lives while its block runs or while a [`ScopeRef`] to it exists.
//! Closures hold a `ScopeRef` to their defining scope and every scope holds
//! one to its parent, so a closure keeps its whole chain alive. A function
//! stored in the scope it closes over keeps that scope's count above zero
//! forever; closed scopes that are still held are therefore swept from time
//! to time, and those reachable only from other closed scopes are reclaimed.

use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::value::{Closure, Value};

/// Detached scopes tolerated before the first sweep.
const MIN_SWEEP: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// Counted hold on a scope. The slot survives [`Scopes::release`] while any
/// clone of it is alive.
#[derive(Debug, Clone)]
pub struct ScopeRef(Rc<ScopeId>);

impl ScopeRef {
    pub fn id(&self) -> ScopeId {
        *self.0
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub is_const: bool,
    pub is_pub: bool,
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeRef>,
    vars: HashMap<String, Binding>,
    /// Its block is still running
    open: bool,
    holders: Weak<ScopeId>,
}

/// Result of looking a name up for assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    Undefined,
    Const,
}

#[derive(Debug)]
pub struct Scopes {
    slots: Vec<Option<Scope>>,
    free: Vec<usize>,
    /// Closed scopes kept by a `ScopeRef`; may hold stale or repeated slots
    detached: Vec<usize>,
    next_sweep: usize,
}

impl Default for Scopes {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            detached: Vec::new(),
            next_sweep: MIN_SWEEP,
        }
    }
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a scope under `parent`.
    pub fn push(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let scope = Scope {
            parent: parent.map(|p| self.handle(p)),
            vars: HashMap::new(),
            open: true,
            holders: Weak::new(),
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(scope);
                ScopeId(slot)
            }
            None => {
                self.slots.push(Some(scope));
                ScopeId(self.slots.len() - 1)
            }
        }
    }

    /// A counted hold on `id`, shared with every other hold on it.
    pub fn handle(&mut self, id: ScopeId) -> ScopeRef {
        let Some(scope) = self.scope_mut(id) else {
            return ScopeRef(Rc::new(id));
        };
        match scope.holders.upgrade() {
            Some(rc) => ScopeRef(rc),
            None => {
                let rc = Rc::new(id);
                scope.holders = Rc::downgrade(&rc);
                ScopeRef(rc)
            }
        }
    }

    /// Close a scope. It is freed now unless something still holds it.
    pub fn release(&mut self, id: ScopeId) {
        let Some(scope) = self.scope_mut(id) else {
            return;
        };
        scope.open = false;
        if scope.holders.strong_count() > 0 {
            self.detached.push(id.0);
            if self.detached.len() >= self.next_sweep {
                self.sweep();
            }
        } else {
            self.reclaim(id.0);
        }
    }

    /// Free a closed, unheld slot, then each closed ancestor it was the last
    /// holder of.
    fn reclaim(&mut self, slot: usize) {
        let mut next = Some(slot);
        while let Some(slot) = next.take() {
            let Some(scope) = self.slots[slot].take() else {
                break;
            };
            self.free.push(slot);
            let Scope { parent, vars, .. } = scope;
            drop(vars);
            if let Some(parent) = parent {
                let pid = parent.id();
                drop(parent);
                if matches!(self.scope(pid), Some(p) if !p.open && p.holders.strong_count() == 0) {
                    next = Some(pid.0);
                }
            }
        }
    }

    /// Reclaim detached scopes that nothing outside the detached set can
    /// reach.
    ///
    /// A detached scope is externally held when its hold count exceeds the
    /// holds found inside other detached scopes: child scopes' parent links,
    /// plus closures referenced only from detached bindings. Everything
    /// reachable from an externally held scope survives.
    pub fn sweep(&mut self) {
        let detached = std::mem::take(&mut self.detached);
        let candidates: HashSet<usize> = detached
            .into_iter()
            .filter(|&s| matches!(self.slots.get(s), Some(Some(scope)) if !scope.open))
            .collect();

        let mut internal: HashMap<usize, usize> = HashMap::new();
        // closure -> (refs from candidates, total refs, captured scope)
        let mut closures: HashMap<*const Closure, (usize, usize, usize)> = HashMap::new();
        for &s in &candidates {
            let Some(scope) = self.scope(ScopeId(s)) else {
                continue;
            };
            if let Some(p) = &scope.parent {
                if candidates.contains(&p.id().0) {
                    *internal.entry(p.id().0).or_default() += 1;
                }
            }
            for binding in scope.vars.values() {
                binding.value.visit_closures(&mut |c| {
                    closures
                        .entry(Rc::as_ptr(c))
                        .or_insert((0, Rc::strong_count(c), c.scope.id().0))
                        .0 += 1;
                });
            }
        }
        for &(seen, total, target) in closures.values() {
            if seen == total && candidates.contains(&target) {
                *internal.entry(target).or_default() += 1;
            }
        }

        let mut pending: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|s| {
                let held = self
                    .scope(ScopeId(*s))
                    .map_or(0, |scope| scope.holders.strong_count());
                held > internal.get(s).copied().unwrap_or(0)
            })
            .collect();
        let mut live: HashSet<usize> = pending.iter().copied().collect();
        while let Some(s) = pending.pop() {
            let Some(scope) = self.scope(ScopeId(s)) else {
                continue;
            };
            let mut reach = Vec::new();
            if let Some(p) = &scope.parent {
                reach.push(p.id().0);
            }
            for binding in scope.vars.values() {
                binding.value.visit_closures(&mut |c| reach.push(c.scope.id().0));
            }
            for t in reach {
                if candidates.contains(&t) && live.insert(t) {
                    pending.push(t);
                }
            }
        }

        let mut garbage = Vec::new();
        for s in candidates {
            if live.contains(&s) {
                self.detached.push(s);
            } else if let Some(scope) = self.slots[s].take() {
                self.free.push(s);
                garbage.push(scope);
            }
        }
        drop(garbage);
        self.next_sweep = (2 * self.detached.len()).max(MIN_SWEEP);
    }

    fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn define(&mut self, id: ScopeId, name: impl Into<String>, value: Value, is_const: bool) {
        self.define_binding(
            id,
            name.into(),
            Binding {
                value,
                is_const,
                is_pub: false,
            },
        );
    }

    pub fn define_binding(&mut self, id: ScopeId, name: String, binding: Binding) {
        if let Some(scope) = self.scope_mut(id) {
            scope.vars.insert(name, binding);
        }
    }

    /// Binding declared directly in `id`, ignoring parents.
    pub fn local(&self, id: ScopeId, name: &str) -> Option<&Binding> {
        self.scope(id)?.vars.get(name)
    }

    /// Walk from `id` outward to the nearest binding of `name`.
    pub fn find(&self, id: ScopeId, name: &str) -> Option<(ScopeId, &Binding)> {
        let mut cur = Some(id);
        while let Some(sid) = cur {
            let scope = self.scope(sid)?;
            if let Some(b) = scope.vars.get(name) {
                return Some((sid, b));
            }
            cur = scope.parent.as_ref().map(ScopeRef::id);
        }
        None
    }

    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<&Value> {
        self.find(id, name).map(|(_, b)| &b.value)
    }

    /// Rebind an existing name where it was declared.
    pub fn assign(&mut self, id: ScopeId, name: &str, value: Value) -> Result<(), AssignError> {
        let (owner, binding) = self.find(id, name).ok_or(AssignError::Undefined)?;
        if binding.is_const {
            return Err(AssignError::Const);
        }
        if let Some(b) = self.scope_mut(owner).and_then(|s| s.vars.get_mut(name)) {
            b.value = value;
        }
        Ok(())
    }

    /// `pub` bindings of one scope, sorted by name.
    pub fn exports(&self, id: ScopeId) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> = self
            .scope(id)
            .map(|s| {
                s.vars
                    .iter()
                    .filter(|(_, b)| b.is_pub)
                    .map(|(n, b)| (n.clone(), b.value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of live scopes.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FnBody;

    fn closure_over(scope: ScopeRef) -> Value {
        Value::Function(Rc::new(Closure {
            name: None,
            params: Vec::new(),
            body: FnBody::Pipeline(Vec::new()),
            scope,
        }))
    }

    #[test]
    fn lookup_walks_parents_and_shadowing_wins() {
        let mut s = Scopes::new();
        let root = s.push(None);
        s.define(root, "x", Value::Int(1), false);
        let child = s.push(Some(root));
        assert_eq!(s.lookup(child, "x"), Some(&Value::Int(1)));
        s.define(child, "x", Value::Int(2), false);
        assert_eq!(s.lookup(child, "x"), Some(&Value::Int(2)));
        assert_eq!(s.lookup(root, "x"), Some(&Value::Int(1)));
    }

    #[test]
    fn assign_updates_declaring_scope() {
        let mut s = Scopes::new();
        let root = s.push(None);
        s.define(root, "n", Value::Int(1), false);
        s.define(root, "k", Value::Int(1), true);
        let child = s.push(Some(root));
        s.assign(child, "n", Value::Int(5)).unwrap();
        assert_eq!(s.lookup(root, "n"), Some(&Value::Int(5)));
        assert_eq!(s.assign(child, "k", Value::Int(2)), Err(AssignError::Const));
        assert_eq!(s.lookup(root, "k"), Some(&Value::Int(1)));
        assert_eq!(s.assign(child, "zz", Value::Unit), Err(AssignError::Undefined));
    }

    #[test]
    fn unheld_scopes_are_reclaimed() {
        let mut s = Scopes::new();
        let root = s.push(None);
        let a = s.push(Some(root));
        s.release(a);
        assert_eq!(s.live(), 1);
        // the freed slot is reused
        let b = s.push(Some(root));
        assert_eq!(a, b);
    }

    #[test]
    fn held_scope_outlives_its_block_with_its_parents() {
        let mut s = Scopes::new();
        let root = s.push(None);
        let outer = s.push(Some(root));
        let inner = s.push(Some(outer));
        s.define(outer, "count", Value::Int(0), false);
        let hold = s.handle(inner);
        s.release(inner);
        s.release(outer);
        assert_eq!(s.live(), 3);
        assert_eq!(s.lookup(hold.id(), "count"), Some(&Value::Int(0)));

        drop(hold);
        s.sweep();
        assert_eq!(s.live(), 1);
    }

    #[test]
    fn closure_stored_in_its_own_scope_is_swept() {
        let mut s = Scopes::new();
        let root = s.push(None);
        let call = s.push(Some(root));
        let f = closure_over(s.handle(call));
        s.define(call, "f", f, false);
        s.release(call);
        assert_eq!(s.live(), 2);
        s.sweep();
        assert_eq!(s.live(), 1);
    }

    #[test]
    fn sweep_keeps_scopes_held_from_outside() {
        let mut s = Scopes::new();
        let root = s.push(None);
        let call = s.push(Some(root));
        let f = closure_over(s.handle(call));
        s.define(call, "f", f.clone(), false);
        s.release(call);
        s.sweep();
        assert_eq!(s.live(), 2);

        // once stored in a live scope the closure still keeps `call`
        s.define(root, "g", f, false);
        s.sweep();
        assert_eq!(s.live(), 2);
        s.define(root, "g", Value::Unit, false);
        s.sweep();
        assert_eq!(s.live(), 1);
    }
}
