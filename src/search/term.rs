use std::rc::Rc;

use crate::search::{context::SearchContext, value::ValueEquality};

/// A numeric identifier for a single variable cell in the engine's store.
pub type VarId = u32;

/// A term is either a reference to a variable cell or an opaque user value.
///
/// The engine never looks inside a [`Term::Val`]; values are compared with
/// host equality during unification. Equality on `Term` itself is structural
/// (a variable reference equals the same reference); use
/// [`SearchContext::terms_equal`](crate::search::context::SearchContext::terms_equal)
/// for binding-aware comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term<V> {
    Var(VarId),
    Val(V),
}

impl<V> Term<V> {
    /// Returns the payload if this term is a value.
    pub fn as_val(&self) -> Option<&V> {
        match self {
            Term::Val(v) => Some(v),
            Term::Var(_) => None,
        }
    }
}

/// Custom behavior for a variable.
///
/// This is the capability-interface rendering of variable subclassing: a
/// concrete policy can veto bindings (domain membership checks) and supply
/// the candidate values the variable should range over. Attach one with
/// [`SearchContext::new_var_with_policy`](crate::search::context::SearchContext::new_var_with_policy)
/// or [`SearchContext::set_policy`](crate::search::context::SearchContext::set_policy).
pub trait VarPolicy<V: ValueEquality>: std::fmt::Debug {
    /// Called with a proposed binding before anything is trailed. Returning
    /// `false` rejects the binding and the unification fails with no
    /// mutation committed.
    fn check_bind(&self, value: &Term<V>, ctx: &SearchContext<V>) -> bool {
        let _ = (value, ctx);
        true
    }

    /// Candidate values for this variable, in the order they should be
    /// tried. The default is no candidates.
    fn choices(&self, ctx: &SearchContext<V>) -> Vec<Term<V>> {
        let _ = ctx;
        Vec::new()
    }
}

/// Shared handle to a variable policy.
pub type PolicyRef<V> = Rc<dyn VarPolicy<V>>;
