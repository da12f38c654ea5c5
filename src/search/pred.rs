use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::search::{choice::ChoiceSequence, context::SearchContext, value::ValueEquality};

/// Shared handle to a predicate instance in a continuation chain.
///
/// Meta-predicates re-link continuations while the engine runs, so chain
/// nodes need shared ownership and interior mutability. A predicate tree is
/// built once per call to
/// [`SearchEngine::execute`](crate::search::engine::SearchEngine::execute)
/// and dropped with the last handle.
pub type PredRef<V> = Rc<RefCell<dyn Predicate<V>>>;

/// Wraps a predicate into the shared handle the engine works with.
pub fn share<V: ValueEquality>(pred: impl Predicate<V> + 'static) -> PredRef<V> {
    Rc::new(RefCell::new(pred))
}

/// Instruction returned by [`Predicate::more_choices`], interpreted by the
/// engine driver.
#[derive(Debug)]
pub enum Retry<V: ValueEquality> {
    /// No alternatives remain. The predicate's choice point is dropped and
    /// failure propagates to the previous one.
    Exhausted,
    /// The alternative just tried did not hold. The choice point stays; the
    /// engine rewinds to it and asks this predicate again.
    Failed,
    /// An alternative was applied. `keep: false` marks a deterministic step:
    /// no further alternatives exist and no choice point survives.
    Applied { keep: bool },
    /// Transfer control into another predicate chain. `None` stands for the
    /// empty chain, i.e. immediate success.
    Call {
        pred: Option<PredRef<V>>,
        keep: bool,
    },
    /// Drop choice points back to `depth` without rewinding any bindings,
    /// then continue into `pred`.
    Cut {
        depth: usize,
        pred: Option<PredRef<V>>,
    },
}

/// The contract every predicate instance honors.
///
/// The engine enters a predicate once ([`initialize_call`]), then drives it
/// through alternatives ([`more_choices`]), validating each applied
/// alternative ([`test_choice`]) before following the [`continuation`]. On a
/// later failure the engine rewinds the trail to the state right after
/// initialization and asks for the next alternative.
///
/// Logical failure is expressed through return values (`Ok(false)`,
/// [`Retry::Failed`], [`Retry::Exhausted`]); an `Err` aborts the whole run
/// and propagates out of `execute` after the engine restores the trail.
///
/// [`initialize_call`]: Predicate::initialize_call
/// [`more_choices`]: Predicate::more_choices
/// [`test_choice`]: Predicate::test_choice
/// [`continuation`]: Predicate::continuation
pub trait Predicate<V: ValueEquality>: std::fmt::Debug {
    /// Runs once on entry, before any choice point exists. Sets up state
    /// such as the choice sequence. Returning `Ok(false)` fails the call
    /// outright.
    fn initialize_call(&mut self, ctx: &mut SearchContext<V>) -> Result<bool> {
        let _ = ctx;
        Ok(true)
    }

    /// Produces and applies the next alternative.
    fn more_choices(&mut self, ctx: &mut SearchContext<V>) -> Result<Retry<V>>;

    /// Validates the consequences of the alternative just applied, e.g. by
    /// propagating constraints. Returning `Ok(false)` rejects it and the
    /// engine rewinds to this predicate's choice point.
    fn test_choice(&mut self, ctx: &mut SearchContext<V>) -> Result<bool> {
        let _ = ctx;
        Ok(true)
    }

    /// The predicate to run after this one succeeds.
    fn continuation(&self) -> Option<PredRef<V>>;

    /// Re-links the continuation; meta-predicates call this while composing.
    fn set_continuation(&mut self, cont: Option<PredRef<V>>);

    /// Diagnostic label, used by the run statistics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// The default pull-apply discipline for iterator-driven predicates: draw
/// the next choice from `seq` and apply it.
pub fn apply_next<V: ValueEquality>(
    seq: Option<&mut ChoiceSequence<V>>,
    ctx: &mut SearchContext<V>,
) -> Result<Retry<V>> {
    let Some(seq) = seq else {
        return Ok(Retry::Exhausted);
    };
    let Some(mut choice) = seq.next() else {
        return Ok(Retry::Exhausted);
    };
    if choice.apply(ctx)? {
        Ok(Retry::Applied { keep: true })
    } else {
        Ok(Retry::Failed)
    }
}

/// General predicate built from a closure that assembles its choice
/// sequence at call time.
pub struct Pred<V: ValueEquality> {
    init: Box<dyn FnMut(&mut SearchContext<V>) -> Result<ChoiceSequence<V>>>,
    choices: Option<ChoiceSequence<V>>,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> Pred<V> {
    pub fn new(
        init: impl FnMut(&mut SearchContext<V>) -> Result<ChoiceSequence<V>> + 'static,
    ) -> Self {
        Self {
            init: Box::new(init),
            choices: None,
            continuation: None,
        }
    }
}

impl<V: ValueEquality> std::fmt::Debug for Pred<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pred").finish_non_exhaustive()
    }
}

impl<V: ValueEquality> Predicate<V> for Pred<V> {
    fn initialize_call(&mut self, ctx: &mut SearchContext<V>) -> Result<bool> {
        self.choices = Some((self.init)(ctx)?);
        Ok(true)
    }

    fn more_choices(&mut self, ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        apply_next(self.choices.as_mut(), ctx)
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// Deterministic predicate: exactly one solution, produced at call time.
/// Leaves no choice point behind.
pub struct DetPred<V: ValueEquality> {
    action: Box<dyn FnMut(&mut SearchContext<V>) -> Result<()>>,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> DetPred<V> {
    pub fn new(action: impl FnMut(&mut SearchContext<V>) -> Result<()> + 'static) -> Self {
        Self {
            action: Box::new(action),
            continuation: None,
        }
    }
}

impl<V: ValueEquality> std::fmt::Debug for DetPred<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetPred").finish_non_exhaustive()
    }
}

impl<V: ValueEquality> Predicate<V> for DetPred<V> {
    fn initialize_call(&mut self, ctx: &mut SearchContext<V>) -> Result<bool> {
        (self.action)(ctx)?;
        Ok(true)
    }

    fn more_choices(&mut self, _ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        Ok(Retry::Applied { keep: false })
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// Semi-deterministic predicate: at most one solution; the call itself may
/// fail. Leaves no choice point behind.
pub struct SemiDetPred<V: ValueEquality> {
    action: Box<dyn FnMut(&mut SearchContext<V>) -> Result<bool>>,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> SemiDetPred<V> {
    pub fn new(action: impl FnMut(&mut SearchContext<V>) -> Result<bool> + 'static) -> Self {
        Self {
            action: Box::new(action),
            continuation: None,
        }
    }
}

impl<V: ValueEquality> std::fmt::Debug for SemiDetPred<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemiDetPred").finish_non_exhaustive()
    }
}

impl<V: ValueEquality> Predicate<V> for SemiDetPred<V> {
    fn initialize_call(&mut self, ctx: &mut SearchContext<V>) -> Result<bool> {
        (self.action)(ctx)
    }

    fn more_choices(&mut self, _ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        Ok(Retry::Applied { keep: false })
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// The always-failing predicate. Idiomatically the tail of a conjunction,
/// forcing enumeration of every solution of the predicates before it.
#[derive(Debug)]
pub struct Fail<V: ValueEquality> {
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> Predicate<V> for Fail<V> {
    fn more_choices(&mut self, _ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        Ok(Retry::Exhausted)
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// A fresh `fail` predicate.
pub fn fail<V: ValueEquality>() -> PredRef<V> {
    share(Fail { continuation: None })
}
