use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::search::{
    context::SearchContext,
    pred::{fail, share, PredRef, Predicate, Retry},
    value::ValueEquality,
};

/// Follows the continuation chain to its final predicate.
pub fn last_pred<V: ValueEquality>(pred: &PredRef<V>) -> PredRef<V> {
    let mut current = pred.clone();
    loop {
        let next = current.borrow().continuation();
        match next {
            Some(next) => current = next,
            None => return current,
        }
    }
}

/// Chains the predicates into a single conjunction: each predicate's final
/// continuation points at the next one. Returns `None` for an empty list.
pub fn conjunct<V: ValueEquality>(preds: Vec<PredRef<V>>) -> Option<PredRef<V>> {
    let mut iter = preds.into_iter();
    let first = iter.next()?;
    let mut tail = first.clone();
    for next in iter {
        last_pred(&tail).borrow_mut().set_continuation(Some(next.clone()));
        tail = next;
    }
    Some(first)
}

/// A branch of a disjunction with its chain tail cached at construction.
/// The tail is where the disjunction splices in its own continuation; it is
/// remembered up front so that re-entry after outer backtracking re-links
/// the same spot instead of walking through a previously spliced chain.
#[derive(Debug)]
struct Branch<V: ValueEquality> {
    head: PredRef<V>,
    tail: PredRef<V>,
}

impl<V: ValueEquality> Branch<V> {
    fn new(head: PredRef<V>) -> Self {
        let tail = last_pred(&head);
        Self { head, tail }
    }
}

/// Tries each branch in order. A branch's success continues into the
/// disjunction's own continuation; on failure the next branch is tried
/// from a fresh trail mark.
#[derive(Debug)]
pub struct Disjunction<V: ValueEquality> {
    branches: Vec<Branch<V>>,
    cursor: usize,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> Disjunction<V> {
    pub fn new(branches: Vec<PredRef<V>>) -> PredRef<V> {
        share(Self {
            branches: branches.into_iter().map(Branch::new).collect(),
            cursor: 0,
            continuation: None,
        })
    }
}

impl<V: ValueEquality> Predicate<V> for Disjunction<V> {
    fn initialize_call(&mut self, _ctx: &mut SearchContext<V>) -> Result<bool> {
        self.cursor = 0;
        Ok(true)
    }

    fn more_choices(&mut self, _ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        let Some(branch) = self.branches.get(self.cursor) else {
            return Ok(Retry::Exhausted);
        };
        let (head, tail) = (branch.head.clone(), branch.tail.clone());
        self.cursor += 1;
        tail.borrow_mut().set_continuation(self.continuation.clone());
        Ok(Retry::Call {
            pred: Some(head),
            keep: true,
        })
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// Builds one body predicate per iteration of [`Loop`].
pub trait LoopBodyFactory<V: ValueEquality>: std::fmt::Debug {
    /// Whether another iteration should run.
    fn loop_continues(&mut self, ctx: &mut SearchContext<V>) -> Result<bool>;

    /// The predicate for the next iteration's body.
    fn make_body_pred(&mut self, ctx: &mut SearchContext<V>) -> PredRef<V>;
}

/// A dynamically unfolded conjunction: while the factory reports more work,
/// run a fresh body predicate, then ask again. Nothing is materialized up
/// front; the loop predicate re-links itself as each body's continuation.
#[derive(Debug)]
pub struct Loop<V: ValueEquality> {
    factory: Box<dyn LoopBodyFactory<V>>,
    me: Weak<RefCell<dyn Predicate<V>>>,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> Loop<V> {
    pub fn new(factory: Box<dyn LoopBodyFactory<V>>) -> PredRef<V> {
        let pred: Rc<RefCell<Loop<V>>> = Rc::new_cyclic(|me: &Weak<RefCell<Loop<V>>>| {
            let me: Weak<RefCell<dyn Predicate<V>>> = me.clone();
            RefCell::new(Loop {
                factory,
                me,
                continuation: None,
            })
        });
        pred
    }
}

impl<V: ValueEquality> Predicate<V> for Loop<V> {
    fn more_choices(&mut self, ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        if self.factory.loop_continues(ctx)? {
            let body = self.factory.make_body_pred(ctx);
            let me = self.me.upgrade().expect("loop predicate is alive during execution");
            last_pred(&body).borrow_mut().set_continuation(Some(me));
            Ok(Retry::Call {
                pred: Some(body),
                keep: false,
            })
        } else {
            Ok(Retry::Call {
                pred: self.continuation.clone(),
                keep: false,
            })
        }
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// Runs the inner predicate and, once it succeeds, cuts every choice point
/// created since entry. Backtracking past `Once` never re-enters the inner
/// predicate; if the inner predicate fails, `Once` fails.
#[derive(Debug)]
pub struct Once<V: ValueEquality> {
    inner: Branch<V>,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> Once<V> {
    pub fn new(inner: PredRef<V>) -> PredRef<V> {
        share(Self {
            inner: Branch::new(inner),
            continuation: None,
        })
    }
}

impl<V: ValueEquality> Predicate<V> for Once<V> {
    fn more_choices(&mut self, ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        // Choice points at entry, minus this predicate's own.
        let barrier = ctx.choice_points() - 1;
        let end = share(OnceEnd {
            barrier,
            continuation: self.continuation.clone(),
        });
        self.inner.tail.borrow_mut().set_continuation(Some(end));
        Ok(Retry::Call {
            pred: Some(self.inner.head.clone()),
            keep: false,
        })
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// Terminator for [`Once`]: performs the cut, then continues.
#[derive(Debug)]
struct OnceEnd<V: ValueEquality> {
    barrier: usize,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> Predicate<V> for OnceEnd<V> {
    fn more_choices(&mut self, _ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        Ok(Retry::Cut {
            depth: self.barrier,
            pred: self.continuation.clone(),
        })
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// Double negation: succeeds iff the inner predicate can succeed, with
/// every binding the probe made undone before the continuation runs.
#[derive(Debug)]
pub struct NotNot<V: ValueEquality> {
    inner: Branch<V>,
    probed: bool,
    succeeded: Rc<Cell<bool>>,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> NotNot<V> {
    pub fn new(inner: PredRef<V>) -> PredRef<V> {
        share(Self {
            inner: Branch::new(inner),
            probed: false,
            succeeded: Rc::new(Cell::new(false)),
            continuation: None,
        })
    }
}

impl<V: ValueEquality> Predicate<V> for NotNot<V> {
    fn initialize_call(&mut self, _ctx: &mut SearchContext<V>) -> Result<bool> {
        self.probed = false;
        self.succeeded.set(false);
        Ok(true)
    }

    fn more_choices(&mut self, ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        if !self.probed {
            self.probed = true;
            let end = share(NotNotEnd {
                barrier: ctx.choice_points(),
                witness: self.succeeded.clone(),
                continuation: None,
            });
            self.inner.tail.borrow_mut().set_continuation(Some(end));
            return Ok(Retry::Call {
                pred: Some(self.inner.head.clone()),
                keep: true,
            });
        }
        if self.succeeded.get() {
            Ok(Retry::Applied { keep: false })
        } else {
            Ok(Retry::Exhausted)
        }
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}

/// Terminator for [`NotNot`]: records that the probe succeeded, cuts back
/// to the barrier and fails, which sends the engine back into [`NotNot`]
/// with the probe's bindings rewound.
#[derive(Debug)]
struct NotNotEnd<V: ValueEquality> {
    barrier: usize,
    witness: Rc<Cell<bool>>,
    continuation: Option<PredRef<V>>,
}

impl<V: ValueEquality> Predicate<V> for NotNotEnd<V> {
    fn more_choices(&mut self, _ctx: &mut SearchContext<V>) -> Result<Retry<V>> {
        self.witness.set(true);
        Ok(Retry::Cut {
            depth: self.barrier,
            pred: Some(fail()),
        })
    }

    fn continuation(&self) -> Option<PredRef<V>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<V>>) {
        self.continuation = cont;
    }
}
