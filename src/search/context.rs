use crate::search::{
    stats::SearchStats,
    term::{PolicyRef, Term, VarId},
    trail::{Trail, TrailEntry, TrailMark},
    value::{ValueEquality, ValueOrdering},
};

/// One cell in the variable store.
#[derive(Debug)]
struct VarCell<V: ValueEquality> {
    /// `None` is an unbound plain variable. Updatable cells always hold a
    /// term.
    slot: Option<Term<V>>,
    updatable: bool,
    policy: Option<PolicyRef<V>>,
}

/// The mutable search state threaded through every predicate hook: the
/// variable store, the trail, and the run statistics.
///
/// All cell mutation flows through [`unify`](SearchContext::unify), which
/// records an undo entry on the trail for every change. The engine rewinds
/// those entries in reverse order when a choice fails, so a hook never needs
/// to clean up after itself.
#[derive(Debug)]
pub struct SearchContext<V: ValueEquality> {
    cells: Vec<VarCell<V>>,
    trail: Trail<V>,
    stats: SearchStats,
    choice_points: usize,
}

impl<V: ValueEquality> SearchContext<V> {
    pub(crate) fn new() -> Self {
        Self {
            cells: Vec::new(),
            trail: Trail::new(),
            stats: SearchStats::default(),
            choice_points: 0,
        }
    }

    /// Creates a fresh unbound variable.
    pub fn new_var(&mut self) -> Term<V> {
        self.push_cell(None, false, None)
    }

    /// Creates a fresh unbound variable with custom bind/choice behavior.
    pub fn new_var_with_policy(&mut self, policy: PolicyRef<V>) -> Term<V> {
        self.push_cell(None, false, Some(policy))
    }

    /// Creates an updatable cell holding `initial`. Updatable cells support
    /// backtrackable reassignment: every [`unify`](SearchContext::unify)
    /// against one replaces its content and trails the prior term.
    pub fn new_updatable(&mut self, initial: Term<V>) -> Term<V> {
        self.push_cell(Some(initial), true, None)
    }

    /// Attaches (or replaces) the policy of an existing variable.
    ///
    /// # Panics
    ///
    /// Panics if `var` is not a variable term.
    pub fn set_policy(&mut self, var: &Term<V>, policy: PolicyRef<V>) {
        match var {
            Term::Var(id) => self.cells[*id as usize].policy = Some(policy),
            Term::Val(_) => panic!("set_policy requires a variable term"),
        }
    }

    fn push_cell(
        &mut self,
        slot: Option<Term<V>>,
        updatable: bool,
        policy: Option<PolicyRef<V>>,
    ) -> Term<V> {
        let id = self.cells.len() as VarId;
        self.cells.push(VarCell {
            slot,
            updatable,
            policy,
        });
        Term::Var(id)
    }

    fn cell(&self, id: VarId) -> &VarCell<V> {
        &self.cells[id as usize]
    }

    /// Follows plain-variable bindings to the end of the chain.
    ///
    /// The endpoint is a value, an unbound plain variable, or an updatable
    /// cell; updatable cells are opaque to dereferencing (their content is
    /// read explicitly with [`value`](SearchContext::value)). Idempotent.
    pub fn dereference(&self, t: &Term<V>) -> Term<V> {
        let mut current = t.clone();
        loop {
            let id = match current {
                Term::Var(id) => id,
                Term::Val(_) => return current,
            };
            let cell = self.cell(id);
            if cell.updatable {
                return Term::Var(id);
            }
            match &cell.slot {
                None => return Term::Var(id),
                Some(next) => current = next.clone(),
            }
        }
    }

    /// Dereferences every term in a slice.
    pub fn dereference_all(&self, terms: &[Term<V>]) -> Vec<Term<V>> {
        terms.iter().map(|t| self.dereference(t)).collect()
    }

    /// True iff `t` dereferences to an unbound plain variable. Updatable
    /// cells are never variables in this sense.
    pub fn is_var(&self, t: &Term<V>) -> bool {
        match self.dereference(t) {
            Term::Var(id) => !self.cell(id).updatable,
            Term::Val(_) => false,
        }
    }

    /// The current content of an updatable cell, `None` for anything else.
    pub fn value(&self, t: &Term<V>) -> Option<Term<V>> {
        match t {
            Term::Var(id) if self.cell(*id).updatable => self.cell(*id).slot.clone(),
            _ => None,
        }
    }

    /// Binding-aware equality: both terms dereference to the same endpoint.
    pub fn terms_equal(&self, a: &Term<V>, b: &Term<V>) -> bool {
        self.dereference(a) == self.dereference(b)
    }

    /// Standard order on dereferenced terms: unbound variables compare by
    /// id, values by their `Ord`; a variable and a value are unordered.
    pub fn term_lt(&self, a: &Term<V>, b: &Term<V>) -> bool
    where
        V: ValueOrdering,
    {
        match (self.dereference(a), self.dereference(b)) {
            (Term::Var(x), Term::Var(y)) => x < y,
            (Term::Val(u), Term::Val(v)) => u < v,
            _ => false,
        }
    }

    /// Debug rendering: unbound variables as `X` plus a zero-padded id,
    /// updatable cells by their current content, values via `Debug`.
    pub fn format_term(&self, t: &Term<V>) -> String {
        match self.dereference(t) {
            Term::Var(id) if self.cell(id).updatable => {
                let inner = self.cell(id).slot.clone().expect("updatable cell holds a value");
                format!("UpdatableVar({})", self.format_term(&inner))
            }
            Term::Var(id) => format!("X{id:02}"),
            Term::Val(v) => format!("{v:?}"),
        }
    }

    /// Prolog-style unification over dereferenced endpoints.
    ///
    /// Returns `false` without touching the trail when the terms cannot be
    /// made equal. Values are compared with host equality; unification never
    /// recurses into user values, so structural unification over compound
    /// values is built on top of this in user predicates.
    pub fn unify(&mut self, a: &Term<V>, b: &Term<V>) -> bool {
        let a = self.dereference(a);
        let b = self.dereference(b);
        let a_var = match &a {
            Term::Var(id) => Some(*id),
            Term::Val(_) => None,
        };
        let b_var = match &b {
            Term::Var(id) => Some(*id),
            Term::Val(_) => None,
        };
        match (a_var, b_var) {
            (Some(x), Some(y)) if x == y => true,
            (Some(x), _) if !self.cell(x).updatable => self.bind(x, b),
            (_, Some(y)) if !self.cell(y).updatable => self.bind(y, a),
            (Some(x), _) => self.update(x, b),
            (_, Some(y)) => self.update(y, a),
            (None, None) => a == b,
        }
    }

    /// Binds the unbound plain variable `id`, subject to its policy.
    fn bind(&mut self, id: VarId, value: Term<V>) -> bool {
        if let Some(policy) = self.cell(id).policy.clone() {
            if !policy.check_bind(&value, self) {
                return false;
            }
        }
        self.trail.push(TrailEntry::Bind { var: id });
        self.cells[id as usize].slot = Some(value);
        self.note_mutation();
        true
    }

    /// Reassigns the updatable cell `id`, trailing its prior content.
    fn update(&mut self, id: VarId, value: Term<V>) -> bool {
        let prior = self.cells[id as usize]
            .slot
            .replace(value)
            .expect("updatable cell holds a value");
        self.trail.push(TrailEntry::Update { var: id, prior });
        self.note_mutation();
        true
    }

    fn note_mutation(&mut self) {
        self.stats.bindings += 1;
        self.stats.max_trail_len = self.stats.max_trail_len.max(self.trail.len());
    }

    /// Candidate values from the variable's policy (empty without one).
    pub fn var_choices(&self, t: &Term<V>) -> Vec<Term<V>> {
        match self.dereference(t) {
            Term::Var(id) => match self.cell(id).policy.clone() {
                Some(policy) => policy.choices(self),
                None => Vec::new(),
            },
            Term::Val(_) => Vec::new(),
        }
    }

    /// The number of live choice points, maintained by the engine driver.
    pub fn choice_points(&self) -> usize {
        self.choice_points
    }

    pub(crate) fn set_choice_points(&mut self, depth: usize) {
        self.choice_points = depth;
    }

    pub(crate) fn mark(&self) -> TrailMark {
        self.trail.mark()
    }

    /// Pops trail entries and applies their restorations, newest first,
    /// until the trail is back at `mark`.
    pub(crate) fn rewind_to(&mut self, mark: TrailMark) {
        while self.trail.len() > mark {
            match self.trail.pop().expect("trail entries remain above the mark") {
                TrailEntry::Bind { var } => self.cells[var as usize].slot = None,
                TrailEntry::Update { var, prior } => {
                    self.cells[var as usize].slot = Some(prior)
                }
            }
        }
    }

    /// Statistics for the current run.
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SearchStats {
        &mut self.stats
    }
}
