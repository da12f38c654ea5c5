use crate::error::Result;
use crate::search::{context::SearchContext, term::Term, value::ValueEquality};

/// One alternative produced by a choice sequence.
///
/// Applying a choice performs its mutations through the trail and reports
/// whether the alternative holds. A choice that fails part-way must still
/// have trailed everything it changed; the engine's rewind undoes it.
pub trait Choice<V: ValueEquality>: std::fmt::Debug {
    fn apply(&mut self, ctx: &mut SearchContext<V>) -> Result<bool>;
}

/// A lazily drained source of alternatives for one predicate call.
pub type ChoiceSequence<V> = Box<dyn Iterator<Item = Box<dyn Choice<V>>>>;

/// Unifies a variable with one candidate value.
#[derive(Debug, Clone)]
pub struct VarChoice<V: ValueEquality> {
    var: Term<V>,
    value: Term<V>,
}

impl<V: ValueEquality> VarChoice<V> {
    pub fn new(var: Term<V>, value: Term<V>) -> Self {
        Self { var, value }
    }
}

impl<V: ValueEquality> Choice<V> for VarChoice<V> {
    fn apply(&mut self, ctx: &mut SearchContext<V>) -> Result<bool> {
        Ok(ctx.unify(&self.var, &self.value))
    }
}

/// Yields a [`VarChoice`] for each candidate value of a variable.
#[derive(Debug)]
pub struct VarChoiceIterator<V: ValueEquality> {
    var: Term<V>,
    values: std::vec::IntoIter<Term<V>>,
}

impl<V: ValueEquality> VarChoiceIterator<V> {
    pub fn new(var: Term<V>, values: Vec<Term<V>>) -> Self {
        Self {
            var,
            values: values.into_iter(),
        }
    }

    /// Builds the iterator from the candidate values of the variable's
    /// policy.
    pub fn from_policy(ctx: &SearchContext<V>, var: Term<V>) -> Self {
        let values = ctx.var_choices(&var);
        Self::new(var, values)
    }

    /// Boxes the iterator as a [`ChoiceSequence`].
    pub fn into_sequence(self) -> ChoiceSequence<V> {
        Box::new(self)
    }
}

impl<V: ValueEquality> Iterator for VarChoiceIterator<V> {
    type Item = Box<dyn Choice<V>>;

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.values.next()?;
        Some(Box::new(VarChoice::new(self.var.clone(), value)))
    }
}
