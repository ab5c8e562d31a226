//! Variable typing: the merge lattice and the value-flow graph.
//!
//! Types are advisory. They decide how a value is *printed* (symbolic enum
//! name versus raw integer) and never influence stack simulation or control
//! flow reconstruction. A variable's resolved type only moves up the lattice
//! or collapses to a conflict, never down.

use std::collections::HashMap;

// ═══════════════════════════════════════════════════════════════════════════
// Types and the merge lattice
// ═══════════════════════════════════════════════════════════════════════════

/// Kind of an inferred type. `Float` doubles as the placeholder: the VM is
/// float-worded, so every value is a float until something proves more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Float,
    Int,
    Bool,
    Coord,
    Object,
    Enum,
    Sound,
    Anim,
}

/// An inferred type: kind plus optional specific subtype (enum name, object
/// class). Two types are equal only when kind and subtype both match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub kind: TypeKind,
    pub subtype: Option<String>,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            subtype: None,
        }
    }

    pub fn with_subtype(kind: TypeKind, subtype: impl Into<String>) -> Self {
        Self {
            kind,
            subtype: Some(subtype.into()),
        }
    }

    /// Lattice rank, low to high specificity:
    /// float placeholder < int < generic kinds < subtyped kinds.
    fn rank(&self) -> u8 {
        match (self.kind, &self.subtype) {
            (TypeKind::Float, _) => 0,
            (TypeKind::Int, _) => 1,
            (_, None) => 2,
            (_, Some(_)) => 3,
        }
    }

    /// True when `other` can replace `self` by moving up one chain of the
    /// lattice (same kind, or growing out of the numeric placeholders).
    fn upgrades_to(&self, other: &Type) -> bool {
        if self.rank() >= other.rank() {
            return false;
        }
        match self.kind {
            // The placeholders sit below every chain.
            TypeKind::Float => true,
            // Int grows into any scalar enum-like kind, not into coords.
            TypeKind::Int => other.kind != TypeKind::Coord,
            // A generic kind only sharpens within its own kind.
            _ => self.kind == other.kind,
        }
    }
}

/// Result of merging a candidate type into a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Existing type already covers the candidate.
    Kept,
    /// The variable's type moved up the lattice.
    Upgraded,
    /// Unrelated concrete types met; the variable is now conflicted.
    Conflict { old: Type, new: Type },
}

// ═══════════════════════════════════════════════════════════════════════════
// Variables
// ═══════════════════════════════════════════════════════════════════════════

/// Inference state of one variable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypeSlot {
    #[default]
    Unset,
    Known(Type),
    /// Two unrelated observations met; printed as a raw value from here on.
    Conflicted,
}

impl TypeSlot {
    pub fn known(&self) -> Option<&Type> {
        match self {
            TypeSlot::Known(t) => Some(t),
            _ => None,
        }
    }
}

/// Identity of a variable's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarOwner {
    Global,
    Script(u32),
}

pub type VarId = usize;

/// One tracked variable and its value-flow edges.
#[derive(Debug, Clone)]
pub struct Var {
    pub owner: VarOwner,
    pub name: String,
    /// First slot in the owner's variable table.
    pub slot: usize,
    /// 1 for scalars, >1 for arrays.
    pub size: usize,
    pub is_ref: bool,
    pub ty: TypeSlot,
    /// Vars whose value flowed into this one.
    pub assigned_from: Vec<VarId>,
    /// Vars this one's value flowed into.
    pub assigned_to: Vec<VarId>,
}

/// All variables of one decompile run (globals and per-script locals).
///
/// Interning is idempotent on (owner, name): a callee's parameter referenced
/// before its script is processed creates the entry early, and the script's
/// own pass reuses it.
#[derive(Debug, Clone, Default)]
pub struct VarStore {
    vars: Vec<Var>,
    index: HashMap<(VarOwner, String), VarId>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get(&self, id: VarId) -> &Var {
        &self.vars[id]
    }

    pub fn intern(&mut self, owner: VarOwner, name: &str, slot: usize, size: usize) -> VarId {
        if let Some(&id) = self.index.get(&(owner, name.to_string())) {
            return id;
        }
        let id = self.vars.len();
        self.vars.push(Var {
            owner,
            name: name.to_string(),
            slot,
            size,
            is_ref: false,
            ty: TypeSlot::Unset,
            assigned_from: Vec::new(),
            assigned_to: Vec::new(),
        });
        self.index.insert((owner, name.to_string()), id);
        id
    }

    pub fn lookup(&self, owner: VarOwner, name: &str) -> Option<VarId> {
        self.index.get(&(owner, name.to_string())).copied()
    }

    /// Record a directed value-flow edge `from -> to` (assignment, argument
    /// binding).
    pub fn add_assign_edge(&mut self, from: VarId, to: VarId) {
        if from == to {
            return;
        }
        if !self.vars[from].assigned_to.contains(&to) {
            self.vars[from].assigned_to.push(to);
        }
        if !self.vars[to].assigned_from.contains(&from) {
            self.vars[to].assigned_from.push(from);
        }
    }

    /// Record a "same type" edge in both directions (equality comparison).
    pub fn add_equal_edge(&mut self, a: VarId, b: VarId) {
        self.add_assign_edge(a, b);
        self.add_assign_edge(b, a);
    }

    /// Merge `candidate` into the variable's type through the lattice.
    ///
    /// A concrete type always overwrites the float placeholder; a subtyped
    /// enum/object overwrites its generic counterpart; unrelated concrete
    /// types conflict and collapse the variable to "unknown". Conflicted
    /// variables stay conflicted.
    pub fn set_var_type(&mut self, id: VarId, candidate: Type) -> MergeOutcome {
        let var = &mut self.vars[id];
        match &var.ty {
            TypeSlot::Conflicted => MergeOutcome::Kept,
            TypeSlot::Unset => {
                var.ty = TypeSlot::Known(candidate);
                MergeOutcome::Upgraded
            }
            TypeSlot::Known(current) => {
                if *current == candidate || candidate.upgrades_to(current) {
                    MergeOutcome::Kept
                } else if current.upgrades_to(&candidate) {
                    var.ty = TypeSlot::Known(candidate);
                    MergeOutcome::Upgraded
                } else {
                    let old = current.clone();
                    var.ty = TypeSlot::Conflicted;
                    MergeOutcome::Conflict {
                        old,
                        new: candidate,
                    }
                }
            }
        }
    }

    pub fn type_of(&self, id: VarId) -> Option<&Type> {
        self.vars[id].ty.known()
    }

    /// Fixpoint propagation: copy a resolved neighbour's type across an edge
    /// into each unresolved variable, sweeping until a full sweep makes no
    /// progress or the sweep budget runs out.
    ///
    /// Returns conflicts discovered while propagating so the caller can turn
    /// them into notices.
    pub fn resolve_types(&mut self, max_sweeps: usize) -> Vec<(VarId, Type, Type)> {
        let mut conflicts = Vec::new();
        for _ in 0..max_sweeps {
            let mut progress = false;
            for id in 0..self.vars.len() {
                if !matches!(self.vars[id].ty, TypeSlot::Unset) {
                    continue;
                }
                let neighbours: Vec<VarId> = self.vars[id]
                    .assigned_from
                    .iter()
                    .chain(self.vars[id].assigned_to.iter())
                    .copied()
                    .collect();
                let found = neighbours
                    .into_iter()
                    .find_map(|n| self.type_of(n).cloned());
                if let Some(ty) = found {
                    match self.set_var_type(id, ty) {
                        MergeOutcome::Upgraded => progress = true,
                        MergeOutcome::Conflict { old, new } => {
                            conflicts.push((id, old, new));
                        }
                        MergeOutcome::Kept => {}
                    }
                }
            }
            if !progress {
                break;
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(n: usize) -> VarStore {
        let mut store = VarStore::new();
        for i in 0..n {
            store.intern(VarOwner::Global, &format!("v{i}"), i, 1);
        }
        store
    }

    #[test]
    fn placeholder_always_loses() {
        let mut store = store_with(1);
        store.set_var_type(0, Type::new(TypeKind::Float));
        let outcome = store.set_var_type(0, Type::with_subtype(TypeKind::Enum, "COLOUR"));
        assert_eq!(outcome, MergeOutcome::Upgraded);
        assert_eq!(
            store.type_of(0),
            Some(&Type::with_subtype(TypeKind::Enum, "COLOUR"))
        );
    }

    #[test]
    fn specific_overwrites_generic_same_kind() {
        let mut store = store_with(1);
        store.set_var_type(0, Type::new(TypeKind::Object));
        assert_eq!(
            store.set_var_type(0, Type::with_subtype(TypeKind::Object, "CREATURE")),
            MergeOutcome::Upgraded
        );
        // And never back down.
        assert_eq!(
            store.set_var_type(0, Type::new(TypeKind::Object)),
            MergeOutcome::Kept
        );
        assert_eq!(
            store.set_var_type(0, Type::new(TypeKind::Float)),
            MergeOutcome::Kept
        );
    }

    #[test]
    fn unrelated_concrete_types_conflict() {
        let mut store = store_with(1);
        store.set_var_type(0, Type::with_subtype(TypeKind::Enum, "COLOUR"));
        let outcome = store.set_var_type(0, Type::with_subtype(TypeKind::Enum, "SPIRIT_TYPE"));
        assert!(matches!(outcome, MergeOutcome::Conflict { .. }));
        assert_eq!(store.type_of(0), None);
        // Conflicted is terminal.
        assert_eq!(
            store.set_var_type(0, Type::new(TypeKind::Int)),
            MergeOutcome::Kept
        );
    }

    #[test]
    fn int_grows_into_enum_but_not_coord() {
        let mut store = store_with(2);
        store.set_var_type(0, Type::new(TypeKind::Int));
        assert_eq!(
            store.set_var_type(0, Type::with_subtype(TypeKind::Enum, "COLOUR")),
            MergeOutcome::Upgraded
        );

        store.set_var_type(1, Type::new(TypeKind::Int));
        assert!(matches!(
            store.set_var_type(1, Type::new(TypeKind::Coord)),
            MergeOutcome::Conflict { .. }
        ));
    }

    #[test]
    fn resolve_copies_across_edges() {
        let mut store = store_with(3);
        // v0 -> v1 -> v2, only v0 typed.
        store.add_assign_edge(0, 1);
        store.add_assign_edge(1, 2);
        store.set_var_type(0, Type::with_subtype(TypeKind::Enum, "COLOUR"));

        let conflicts = store.resolve_types(8);
        assert!(conflicts.is_empty());
        assert_eq!(
            store.type_of(2),
            Some(&Type::with_subtype(TypeKind::Enum, "COLOUR"))
        );
    }

    #[test]
    fn resolve_respects_sweep_budget() {
        let mut store = store_with(3);
        store.add_assign_edge(0, 1);
        store.add_assign_edge(1, 2);
        store.set_var_type(0, Type::new(TypeKind::Bool));

        // One sweep reaches v1 (and possibly v2 depending on order); zero
        // sweeps must reach nothing.
        store.resolve_types(0);
        assert_eq!(store.type_of(1), None);
    }

    #[test]
    fn interning_is_idempotent() {
        let mut store = VarStore::new();
        let a = store.intern(VarOwner::Script(3), "target", 0, 1);
        let b = store.intern(VarOwner::Script(3), "target", 0, 1);
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }
}
