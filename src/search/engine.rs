use tracing::debug;

use crate::error::Result;
use crate::search::{
    context::SearchContext,
    pred::{PredRef, Retry},
    stats::SearchStats,
    term::{PolicyRef, Term},
    trail::TrailMark,
    value::ValueEquality,
};

/// A live choice point: the predicate that may still produce alternatives
/// and the trail mark to rewind to before asking it.
#[derive(Debug)]
struct Frame<V: ValueEquality> {
    pred: PredRef<V>,
    mark: TrailMark,
}

/// Execution mode of the driver loop.
#[derive(Debug)]
enum Step<V: ValueEquality> {
    /// Enter a predicate for the first time.
    Enter(PredRef<V>),
    /// Ask the predicate on top of the choice-point stack for an
    /// alternative.
    Retry(PredRef<V>),
    /// The current predicate succeeded; continue into the payload, or
    /// terminate when the chain is exhausted.
    Succeed(Option<PredRef<V>>),
    /// The current alternative failed; fall back to the newest choice
    /// point.
    Fail,
}

/// The driver: owns the search state and walks a predicate tree handed to
/// [`execute`](SearchEngine::execute).
///
/// The engine alternates between entering predicates and retrying the
/// newest choice point, rewinding the trail on every failure. One engine
/// runs one call at a time; re-entrant execution is ruled out by the
/// exclusive borrow that `execute` takes.
///
/// Bindings never survive a call: whatever the outcome, the engine rewinds
/// to the state at entry before returning. A caller that wants to observe a
/// solution records it from inside a predicate (see the crate examples).
#[derive(Debug)]
pub struct SearchEngine<V: ValueEquality> {
    ctx: SearchContext<V>,
    frames: Vec<Frame<V>>,
}

impl<V: ValueEquality> SearchEngine<V> {
    pub fn new() -> Self {
        Self {
            ctx: SearchContext::new(),
            frames: Vec::new(),
        }
    }

    /// Creates a fresh unbound variable.
    pub fn new_var(&mut self) -> Term<V> {
        self.ctx.new_var()
    }

    /// Creates a fresh unbound variable with custom bind/choice behavior.
    pub fn new_var_with_policy(&mut self, policy: PolicyRef<V>) -> Term<V> {
        self.ctx.new_var_with_policy(policy)
    }

    /// Creates an updatable cell holding `initial`.
    pub fn new_updatable(&mut self, initial: Term<V>) -> Term<V> {
        self.ctx.new_updatable(initial)
    }

    /// Attaches (or replaces) the policy of an existing variable.
    pub fn set_policy(&mut self, var: &Term<V>, policy: PolicyRef<V>) {
        self.ctx.set_policy(var, policy)
    }

    pub fn unify(&mut self, a: &Term<V>, b: &Term<V>) -> bool {
        self.ctx.unify(a, b)
    }

    pub fn dereference(&self, t: &Term<V>) -> Term<V> {
        self.ctx.dereference(t)
    }

    pub fn dereference_all(&self, terms: &[Term<V>]) -> Vec<Term<V>> {
        self.ctx.dereference_all(terms)
    }

    pub fn is_var(&self, t: &Term<V>) -> bool {
        self.ctx.is_var(t)
    }

    pub fn value(&self, t: &Term<V>) -> Option<Term<V>> {
        self.ctx.value(t)
    }

    pub fn format_term(&self, t: &Term<V>) -> String {
        self.ctx.format_term(t)
    }

    /// Statistics of the most recent [`execute`](SearchEngine::execute) run.
    pub fn stats(&self) -> &SearchStats {
        self.ctx.stats()
    }

    pub fn context(&self) -> &SearchContext<V> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SearchContext<V> {
        &mut self.ctx
    }

    /// Runs the goal to completion and reports whether it succeeded.
    ///
    /// Every binding made during the call is undone before this returns, on
    /// success, failure, and error propagation alike. Terms bound before
    /// the call keep their bindings.
    pub fn execute(&mut self, goal: PredRef<V>) -> Result<bool> {
        self.ctx.stats_mut().reset();
        let base = self.ctx.mark();
        let outcome = self.drive(goal);
        self.frames.clear();
        self.ctx.rewind_to(base);
        self.ctx.set_choice_points(0);
        debug_assert_eq!(self.ctx.mark(), base);
        debug!(?outcome, "search finished");
        outcome
    }

    fn drive(&mut self, goal: PredRef<V>) -> Result<bool> {
        let mut step = Step::Enter(goal);
        loop {
            step = match step {
                Step::Enter(pred) => self.enter(pred)?,
                Step::Retry(pred) => self.retry(pred)?,
                Step::Succeed(next) => match next {
                    Some(next) => Step::Enter(next),
                    None => return Ok(true),
                },
                Step::Fail => match self.frames.last() {
                    Some(frame) => {
                        let pred = frame.pred.clone();
                        let mark = frame.mark;
                        self.ctx.rewind_to(mark);
                        self.ctx.stats_mut().backtracks += 1;
                        Step::Retry(pred)
                    }
                    None => return Ok(false),
                },
            };
        }
    }

    fn enter(&mut self, pred: PredRef<V>) -> Result<Step<V>> {
        let name = pred.borrow().name();
        let stats = self.ctx.stats_mut();
        stats.predicates_called += 1;
        stats.predicate_stats.entry(name).or_default().calls += 1;

        self.sync_choice_points();
        let ok = pred.borrow_mut().initialize_call(&mut self.ctx)?;
        if !ok {
            return Ok(Step::Fail);
        }
        // The mark is taken after initialization, so retries keep the
        // bindings made while entering the predicate.
        self.frames.push(Frame {
            pred: pred.clone(),
            mark: self.ctx.mark(),
        });
        Ok(Step::Retry(pred))
    }

    fn retry(&mut self, pred: PredRef<V>) -> Result<Step<V>> {
        let name = pred.borrow().name();
        self.ctx
            .stats_mut()
            .predicate_stats
            .entry(name)
            .or_default()
            .retries += 1;

        self.sync_choice_points();
        let retry = pred.borrow_mut().more_choices(&mut self.ctx)?;
        Ok(match retry {
            Retry::Exhausted => {
                self.frames.pop();
                Step::Fail
            }
            Retry::Failed => Step::Fail,
            Retry::Applied { keep } => {
                if !keep {
                    self.frames.pop();
                }
                self.ctx.stats_mut().choices_applied += 1;
                self.sync_choice_points();
                if pred.borrow_mut().test_choice(&mut self.ctx)? {
                    let next = pred.borrow().continuation();
                    Step::Succeed(next)
                } else {
                    Step::Fail
                }
            }
            Retry::Call { pred: next, keep } => {
                if !keep {
                    self.frames.pop();
                }
                Step::Succeed(next)
            }
            Retry::Cut { depth, pred: next } => {
                self.frames.truncate(depth);
                self.ctx.stats_mut().cuts += 1;
                Step::Succeed(next)
            }
        })
    }

    fn sync_choice_points(&mut self) {
        self.ctx.set_choice_points(self.frames.len());
    }
}

impl<V: ValueEquality> Default for SearchEngine<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Result;
    use crate::search::{
        choice::{ChoiceSequence, VarChoiceIterator},
        meta::{conjunct, Disjunction, Loop, LoopBodyFactory, NotNot, Once},
        pred::{apply_next, fail, share, DetPred, Pred, Predicate, SemiDetPred},
        value::StandardValue,
    };

    // --- Test Setup ---

    fn int(i: i64) -> Term<StandardValue> {
        Term::Val(StandardValue::Int(i))
    }

    /// The member/2 workhorse: backtracks over candidate values for a
    /// variable.
    fn member(
        var: &Term<StandardValue>,
        values: Vec<i64>,
    ) -> PredRef<StandardValue> {
        let var = var.clone();
        share(Pred::new(move |_ctx| {
            let candidates = values.iter().map(|i| int(*i)).collect();
            Ok(VarChoiceIterator::new(var.clone(), candidates).into_sequence())
        }))
    }

    /// Records the current value of a variable into a shared sink.
    fn record(
        var: &Term<StandardValue>,
        sink: &Rc<RefCell<Vec<Term<StandardValue>>>>,
    ) -> PredRef<StandardValue> {
        let var = var.clone();
        let sink = sink.clone();
        share(DetPred::new(move |ctx| {
            sink.borrow_mut().push(ctx.dereference(&var));
            Ok(())
        }))
    }

    /// Records the current values of several variables as one row.
    fn record_row(
        vars: &[Term<StandardValue>],
        sink: &Rc<RefCell<Vec<Vec<Term<StandardValue>>>>>,
    ) -> PredRef<StandardValue> {
        let vars = vars.to_vec();
        let sink = sink.clone();
        share(DetPred::new(move |ctx| {
            sink.borrow_mut().push(ctx.dereference_all(&vars));
            Ok(())
        }))
    }

    fn unify_pred(
        var: &Term<StandardValue>,
        value: i64,
    ) -> PredRef<StandardValue> {
        let var = var.clone();
        share(SemiDetPred::new(move |ctx| Ok(ctx.unify(&var, &int(value)))))
    }

    // --- Tests ---

    #[test]
    fn det_pred_binding_is_undone_after_success() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();

        let seen = Rc::new(RefCell::new(None));
        let goal = {
            let (x, seen) = (x.clone(), seen.clone());
            share(DetPred::new(move |ctx| {
                if !ctx.unify(&x, &int(7)) {
                    return Err(crate::error::Error::custom("unify refused a fresh variable"));
                }
                *seen.borrow_mut() = Some(ctx.dereference(&x));
                Ok(())
            }))
        };

        assert!(engine.execute(goal).unwrap());
        assert_eq!(*seen.borrow(), Some(int(7)));
        assert!(engine.is_var(&x));
        assert_eq!(engine.dereference(&x), x);
    }

    #[test]
    fn failed_execution_also_rewinds_everything() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();

        let goal = conjunct(vec![unify_pred(&x, 3), fail()]).unwrap();
        assert!(!engine.execute(goal).unwrap());
        assert!(engine.is_var(&x));
    }

    #[test]
    fn bindings_made_before_execute_survive_it() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();
        assert!(engine.unify(&x, &int(1)));

        let goal = unify_pred(&x, 1);
        assert!(engine.execute(goal).unwrap());
        assert_eq!(engine.dereference(&x), int(1));
    }

    #[test]
    fn disjunction_enumerates_branches_in_order() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();
        let results = Rc::new(RefCell::new(Vec::new()));

        let goal = conjunct(vec![
            Disjunction::new(vec![
                unify_pred(&x, 1),
                unify_pred(&x, 2),
                unify_pred(&x, 3),
            ]),
            record(&x, &results),
            fail(),
        ])
        .unwrap();

        assert!(!engine.execute(goal).unwrap());
        assert_eq!(*results.borrow(), vec![int(1), int(2), int(3)]);
        assert!(engine.is_var(&x));
    }

    /// A predicate over `[10, 20]` whose `test_choice` rejects 10.
    struct PickyPred {
        var: Term<StandardValue>,
        choices: Option<ChoiceSequence<StandardValue>>,
        tests: Rc<std::cell::Cell<u32>>,
        continuation: Option<PredRef<StandardValue>>,
    }

    impl std::fmt::Debug for PickyPred {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("PickyPred").finish_non_exhaustive()
        }
    }

    impl Predicate<StandardValue> for PickyPred {
        fn initialize_call(&mut self, _ctx: &mut SearchContext<StandardValue>) -> Result<bool> {
            self.choices = Some(
                VarChoiceIterator::new(self.var.clone(), vec![int(10), int(20)]).into_sequence(),
            );
            Ok(true)
        }

        fn more_choices(&mut self, ctx: &mut SearchContext<StandardValue>) -> Result<Retry<StandardValue>> {
            apply_next(self.choices.as_mut(), ctx)
        }

        fn test_choice(&mut self, ctx: &mut SearchContext<StandardValue>) -> Result<bool> {
            self.tests.set(self.tests.get() + 1);
            Ok(ctx.dereference(&self.var) != int(10))
        }

        fn continuation(&self) -> Option<PredRef<StandardValue>> {
            self.continuation.clone()
        }

        fn set_continuation(&mut self, cont: Option<PredRef<StandardValue>>) {
            self.continuation = cont;
        }
    }

    #[test]
    fn rejected_choice_backtracks_into_the_next_one() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();
        let tests = Rc::new(std::cell::Cell::new(0));
        let accepted = Rc::new(RefCell::new(Vec::new()));

        let picky = share(PickyPred {
            var: x.clone(),
            choices: None,
            tests: tests.clone(),
            continuation: None,
        });
        let goal = conjunct(vec![picky, record(&x, &accepted)]).unwrap();

        assert!(engine.execute(goal).unwrap());
        assert_eq!(tests.get(), 2);
        assert_eq!(*accepted.borrow(), vec![int(20)]);
    }

    #[test]
    fn updatable_cell_is_restored_after_failure() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let u = engine.new_updatable(int(0));

        let set = |value: i64| {
            let u = u.clone();
            share(SemiDetPred::new(move |ctx| Ok(ctx.unify(&u, &int(value)))))
        };
        let goal = conjunct(vec![set(1), set(2), fail()]).unwrap();

        assert!(!engine.execute(goal).unwrap());
        assert_eq!(engine.value(&u), Some(int(0)));
    }

    /// Runs its body exactly `remaining` times.
    #[derive(Debug)]
    struct CountingFactory {
        remaining: u32,
        log: Rc<RefCell<Vec<u32>>>,
        var_source: Vec<Term<StandardValue>>,
    }

    impl LoopBodyFactory<StandardValue> for CountingFactory {
        fn loop_continues(&mut self, _ctx: &mut SearchContext<StandardValue>) -> Result<bool> {
            Ok(self.remaining > 0)
        }

        fn make_body_pred(&mut self, _ctx: &mut SearchContext<StandardValue>) -> PredRef<StandardValue> {
            self.remaining -= 1;
            let iteration = self.remaining;
            let log = self.log.clone();
            let var = self.var_source[iteration as usize].clone();
            share(DetPred::new(move |ctx| {
                ctx.unify(&var, &int(i64::from(iteration)))
                    .then_some(())
                    .ok_or_else(|| crate::error::Error::custom("loop body unify failed"))?;
                log.borrow_mut().push(iteration);
                Ok(())
            }))
        }
    }

    #[test]
    fn loop_runs_body_while_factory_continues() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let vars = vec![engine.new_var(), engine.new_var(), engine.new_var()];
        let log = Rc::new(RefCell::new(Vec::new()));

        let goal = Loop::new(Box::new(CountingFactory {
            remaining: 3,
            log: log.clone(),
            var_source: vars.clone(),
        }));

        assert!(engine.execute(goal).unwrap());
        assert_eq!(*log.borrow(), vec![2, 1, 0]);
        for var in &vars {
            assert!(engine.is_var(var), "loop bindings must be undone");
        }
    }

    #[test]
    fn once_cuts_alternatives_of_its_inner_predicate() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let v1 = engine.new_var();
        let v2 = engine.new_var();
        let v3 = engine.new_var();
        let rows = Rc::new(RefCell::new(Vec::new()));

        let goal = conjunct(vec![
            member(&v1, vec![1, 2]),
            Once::new(member(&v2, vec![1, 2])),
            member(&v3, vec![1, 2]),
            record_row(&[v1.clone(), v2.clone(), v3.clone()], &rows),
            fail(),
        ])
        .unwrap();

        assert!(!engine.execute(goal).unwrap());
        let expected: Vec<Vec<Term<StandardValue>>> = vec![
            vec![int(1), int(1), int(1)],
            vec![int(1), int(1), int(2)],
            vec![int(2), int(1), int(1)],
            vec![int(2), int(1), int(2)],
        ];
        assert_eq!(*rows.borrow(), expected);
    }

    #[test]
    fn disjunction_is_reentrant_after_outer_backtracking() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let v1 = engine.new_var();
        let v2 = engine.new_var();
        let rows = Rc::new(RefCell::new(Vec::new()));

        let goal = conjunct(vec![
            member(&v1, vec![1, 2]),
            Disjunction::new(vec![unify_pred(&v2, 10), unify_pred(&v2, 20)]),
            record_row(&[v1.clone(), v2.clone()], &rows),
            fail(),
        ])
        .unwrap();

        assert!(!engine.execute(goal).unwrap());
        let expected: Vec<Vec<Term<StandardValue>>> = vec![
            vec![int(1), int(10)],
            vec![int(1), int(20)],
            vec![int(2), int(10)],
            vec![int(2), int(20)],
        ];
        assert_eq!(*rows.borrow(), expected);
    }

    #[test]
    fn not_not_is_reentrant_after_outer_backtracking() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let v1 = engine.new_var();
        let v2 = engine.new_var();
        let passes = Rc::new(std::cell::Cell::new(0u32));

        let goal = conjunct(vec![
            member(&v1, vec![1, 2]),
            NotNot::new(member(&v2, vec![5])),
            {
                let passes = passes.clone();
                share(DetPred::new(move |_ctx| {
                    passes.set(passes.get() + 1);
                    Ok(())
                }))
            },
            fail(),
        ])
        .unwrap();

        assert!(!engine.execute(goal).unwrap());
        assert_eq!(passes.get(), 2);
    }

    #[test]
    fn once_of_a_failing_predicate_fails() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let goal = Once::new(fail());
        assert!(!engine.execute(goal).unwrap());
    }

    #[test]
    fn conjunct_of_one_behaves_like_the_predicate() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();

        let alone = conjunct(vec![unify_pred(&x, 5)]).unwrap();
        assert!(engine.execute(alone).unwrap());

        assert!(conjunct::<StandardValue>(vec![]).is_none());
    }

    #[test]
    fn conjunct_is_associative_in_observable_outcomes() {
        let run = |nested: bool| {
            let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
            let x = engine.new_var();
            let y = engine.new_var();
            let rows = Rc::new(RefCell::new(Vec::new()));

            let p = || member(&x, vec![1, 2]);
            let q = || member(&y, vec![3, 4]);
            let r = || record_row(&[x.clone(), y.clone()], &rows);
            let tail = || fail();

            let goal = if nested {
                conjunct(vec![conjunct(vec![p(), q()]).unwrap(), r(), tail()]).unwrap()
            } else {
                conjunct(vec![p(), q(), r(), tail()]).unwrap()
            };
            engine.execute(goal).unwrap();
            let result = rows.borrow().clone();
            result
        };

        assert_eq!(run(true), run(false));
        assert_eq!(run(false).len(), 4);
    }

    #[test]
    fn not_not_succeeds_without_keeping_bindings() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();
        let witnessed = Rc::new(RefCell::new(None));

        let goal = conjunct(vec![
            NotNot::new(member(&x, vec![1, 2])),
            {
                let (x, witnessed) = (x.clone(), witnessed.clone());
                share(DetPred::new(move |ctx| {
                    *witnessed.borrow_mut() = Some(ctx.is_var(&x));
                    Ok(())
                }))
            },
        ])
        .unwrap();

        assert!(engine.execute(goal).unwrap());
        assert_eq!(*witnessed.borrow(), Some(true), "probe bindings must be gone");
    }

    #[test]
    fn not_not_of_a_failing_predicate_fails() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let goal = NotNot::new(fail());
        assert!(!engine.execute(goal).unwrap());
    }

    #[test]
    fn semi_det_failure_in_initialize_fails_the_call() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();
        assert!(engine.unify(&x, &int(1)));

        // x is already 1, so unifying with 2 fails at entry.
        let goal = unify_pred(&x, 2);
        assert!(!engine.execute(goal).unwrap());
        assert_eq!(engine.dereference(&x), int(1));
    }

    #[test]
    fn stats_count_calls_and_backtracks() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();
        let sink = Rc::new(RefCell::new(Vec::new()));

        let goal = conjunct(vec![member(&x, vec![1, 2, 3]), record(&x, &sink), fail()]).unwrap();
        assert!(!engine.execute(goal).unwrap());

        let stats = engine.stats();
        // Three alternatives for `member` plus three deterministic passes
        // through `record`.
        assert_eq!(stats.choices_applied, 6);
        assert_eq!(stats.backtracks, 3);
        assert!(stats.predicates_called > 0);
    }

    #[test]
    fn error_from_a_hook_still_restores_the_trail() {
        let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
        let x = engine.new_var();

        let goal = conjunct(vec![unify_pred(&x, 1), {
            share(DetPred::new(move |_ctx| {
                Err(crate::error::Error::custom("boom"))
            }))
        }])
        .unwrap();

        assert!(engine.execute(goal).is_err());
        assert!(engine.is_var(&x), "abnormal exit must rewind to the entry mark");
    }
}
