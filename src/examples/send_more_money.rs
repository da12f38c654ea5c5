//! The classic cryptarithm:
//!
//! ```text
//!    SEND
//!  + MORE
//!  ------
//!   MONEY
//! ```
//!
//! Every letter stands for a distinct digit. Letters are variables with a
//! [`VarPolicy`] that enforces the all-different rule at bind time; the loop
//! meta-predicate picks the next unassigned variable, and each accepted
//! choice forward-checks the column sums in `test_choice`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::search::{
    choice::{ChoiceSequence, VarChoiceIterator},
    context::SearchContext,
    engine::SearchEngine,
    meta::{conjunct, Loop, LoopBodyFactory},
    pred::{apply_next, fail, share, DetPred, PredRef, Predicate, Retry},
    term::{Term, VarPolicy},
    value::StandardValue,
};

/// The solved digits in S, E, N, D, M, O, R, Y order.
pub type Digits = [i64; 8];

fn int(i: i64) -> Term<StandardValue> {
    Term::Val(StandardValue::Int(i))
}

fn ground_int(ctx: &SearchContext<StandardValue>, t: &Term<StandardValue>) -> Option<i64> {
    match ctx.dereference(t) {
        Term::Val(StandardValue::Int(i)) => Some(i),
        _ => None,
    }
}

/// Digits a variable may take, minus whatever its peers already use.
#[derive(Debug)]
struct DigitPolicy {
    allowed: Vec<i64>,
    peers: RefCell<Vec<Term<StandardValue>>>,
}

impl DigitPolicy {
    fn new(allowed: impl IntoIterator<Item = i64>) -> Rc<Self> {
        Rc::new(Self {
            allowed: allowed.into_iter().collect(),
            peers: RefCell::new(Vec::new()),
        })
    }

    /// Late wiring: the peer set is only complete once every letter exists.
    fn set_peers(&self, peers: Vec<Term<StandardValue>>) {
        *self.peers.borrow_mut() = peers;
    }
}

impl VarPolicy<StandardValue> for DigitPolicy {
    fn check_bind(&self, value: &Term<StandardValue>, ctx: &SearchContext<StandardValue>) -> bool {
        let Term::Val(StandardValue::Int(n)) = value else {
            return false;
        };
        self.allowed.contains(n)
            && !self
                .peers
                .borrow()
                .iter()
                .any(|peer| ctx.dereference(peer) == *value)
    }

    fn choices(&self, ctx: &SearchContext<StandardValue>) -> Vec<Term<StandardValue>> {
        let taken: Vec<Term<StandardValue>> = self
            .peers
            .borrow()
            .iter()
            .map(|peer| ctx.dereference(peer))
            .collect();
        self.allowed
            .iter()
            .map(|n| int(*n))
            .filter(|candidate| !taken.contains(candidate))
            .collect()
    }
}

/// One column of the addition: `sum(addends) == digit + 10 * carry`.
#[derive(Debug, Clone)]
struct ColumnSum {
    addends: Vec<Term<StandardValue>>,
    digit: Term<StandardValue>,
    carry: Term<StandardValue>,
}

/// Forward-checks the columns, assigning digits and carries that have
/// become determined. A fully known column fixes its digit and carry; a
/// column missing exactly one addend with a known result fixes that addend.
/// Returns `false` when a column cannot be satisfied.
fn propagate(ctx: &mut SearchContext<StandardValue>, columns: &[ColumnSum]) -> bool {
    let mut progress = true;
    while progress {
        progress = false;
        for column in columns {
            let addends = ctx.dereference_all(&column.addends);
            let mut unknown = Vec::new();
            let mut known_sum = 0;
            for term in &addends {
                match term.as_val() {
                    Some(StandardValue::Int(n)) => known_sum += n,
                    _ => unknown.push(term.clone()),
                }
            }
            match unknown.as_slice() {
                [] => {
                    if ctx.is_var(&column.digit) || ctx.is_var(&column.carry) {
                        progress = true;
                    }
                    let (carry, digit) = (known_sum / 10, known_sum % 10);
                    if !ctx.unify(&column.digit, &int(digit))
                        || !ctx.unify(&column.carry, &int(carry))
                    {
                        return false;
                    }
                }
                [missing] => {
                    let (Some(digit), Some(carry)) = (
                        ground_int(ctx, &column.digit),
                        ground_int(ctx, &column.carry),
                    ) else {
                        continue;
                    };
                    progress = true;
                    let wanted = digit + 10 * carry - known_sum;
                    if !ctx.unify(missing, &int(wanted)) {
                        return false;
                    }
                }
                _ => {}
            }
        }
    }
    true
}

/// Picks values for one variable; each accepted choice must keep the
/// columns consistent.
struct AssignPred {
    var: Term<StandardValue>,
    columns: Rc<Vec<ColumnSum>>,
    choices: Option<ChoiceSequence<StandardValue>>,
    continuation: Option<PredRef<StandardValue>>,
}

impl std::fmt::Debug for AssignPred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignPred")
            .field("var", &self.var)
            .finish_non_exhaustive()
    }
}

impl Predicate<StandardValue> for AssignPred {
    fn initialize_call(&mut self, ctx: &mut SearchContext<StandardValue>) -> Result<bool> {
        self.choices =
            Some(VarChoiceIterator::from_policy(ctx, self.var.clone()).into_sequence());
        Ok(true)
    }

    fn more_choices(&mut self, ctx: &mut SearchContext<StandardValue>) -> Result<Retry<StandardValue>> {
        apply_next(self.choices.as_mut(), ctx)
    }

    fn test_choice(&mut self, ctx: &mut SearchContext<StandardValue>) -> Result<bool> {
        Ok(propagate(ctx, &self.columns))
    }

    fn continuation(&self) -> Option<PredRef<StandardValue>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<StandardValue>>) {
        self.continuation = cont;
    }

    fn name(&self) -> &'static str {
        "assign"
    }
}

/// Drives one [`AssignPred`] per remaining unassigned variable.
#[derive(Debug)]
struct AssignFactory {
    vars: Vec<Term<StandardValue>>,
    columns: Rc<Vec<ColumnSum>>,
}

impl LoopBodyFactory<StandardValue> for AssignFactory {
    fn loop_continues(&mut self, ctx: &mut SearchContext<StandardValue>) -> Result<bool> {
        Ok(self.vars.iter().any(|v| ctx.is_var(v)))
    }

    fn make_body_pred(&mut self, ctx: &mut SearchContext<StandardValue>) -> PredRef<StandardValue> {
        let var = self
            .vars
            .iter()
            .find(|v| ctx.is_var(v))
            .cloned()
            .expect("loop_continues reported an unbound variable");
        share(AssignPred {
            var,
            columns: self.columns.clone(),
            choices: None,
            continuation: None,
        })
    }
}

/// Solves the puzzle, returning the first solution.
pub fn solve(engine: &mut SearchEngine<StandardValue>) -> Result<Option<Digits>> {
    let solutions = solve_inner(engine, true)?;
    Ok(solutions.into_iter().next())
}

/// Enumerates every solution (the puzzle has exactly one).
pub fn solve_all(engine: &mut SearchEngine<StandardValue>) -> Result<Vec<Digits>> {
    solve_inner(engine, false)
}

fn solve_inner(
    engine: &mut SearchEngine<StandardValue>,
    first_only: bool,
) -> Result<Vec<Digits>> {
    let digits0: Vec<i64> = (0..=9).collect();
    let digits1: Vec<i64> = (1..=9).collect();

    // S, E, N, D, M, O, R, Y. Leading letters cannot be 0, and M is a carry
    // out of the top column.
    let letter_policies: Vec<Rc<DigitPolicy>> = vec![
        DigitPolicy::new(digits1),
        DigitPolicy::new(digits0.clone()),
        DigitPolicy::new(digits0.clone()),
        DigitPolicy::new(digits0.clone()),
        DigitPolicy::new(vec![1, 2]),
        DigitPolicy::new(digits0.clone()),
        DigitPolicy::new(digits0.clone()),
        DigitPolicy::new(digits0),
    ];
    let letters: Vec<Term<StandardValue>> = letter_policies
        .iter()
        .map(|policy| engine.new_var_with_policy(policy.clone()))
        .collect();
    for policy in &letter_policies {
        policy.set_peers(letters.clone());
    }
    let (s, e, n, d, m, o, r, y) = (
        letters[0].clone(),
        letters[1].clone(),
        letters[2].clone(),
        letters[3].clone(),
        letters[4].clone(),
        letters[5].clone(),
        letters[6].clone(),
        letters[7].clone(),
    );

    let carry = |engine: &mut SearchEngine<StandardValue>| {
        engine.new_var_with_policy(DigitPolicy::new(vec![0, 1, 2]))
    };
    let c1 = carry(engine);
    let c2 = carry(engine);
    let c3 = carry(engine);

    let columns = Rc::new(vec![
        ColumnSum {
            addends: vec![d.clone(), e.clone()],
            digit: y.clone(),
            carry: c1.clone(),
        },
        ColumnSum {
            addends: vec![n.clone(), r.clone(), c1.clone()],
            digit: e.clone(),
            carry: c2.clone(),
        },
        ColumnSum {
            addends: vec![e.clone(), o.clone(), c2.clone()],
            digit: n.clone(),
            carry: c3.clone(),
        },
        ColumnSum {
            addends: vec![s.clone(), m.clone(), c3.clone()],
            digit: o.clone(),
            carry: m.clone(),
        },
    ]);

    let enumerate_order = vec![d, e, n, r, s, m, o, y, c1, c2, c3];

    let found: Rc<RefCell<Vec<Digits>>> = Rc::new(RefCell::new(Vec::new()));
    let record = {
        let (letters, found) = (letters.clone(), found.clone());
        share(DetPred::new(move |ctx| {
            let mut digits = [0i64; 8];
            for (slot, letter) in digits.iter_mut().zip(&letters) {
                *slot = ground_int(ctx, letter)
                    .ok_or_else(|| Error::custom("unassigned letter at solution"))?;
            }
            found.borrow_mut().push(digits);
            Ok(())
        }))
    };

    let assign = Loop::new(Box::new(AssignFactory {
        vars: enumerate_order,
        columns,
    }));
    let goal = if first_only {
        conjunct(vec![assign, record])
    } else {
        conjunct(vec![assign, record, fail()])
    }
    .expect("goal list is not empty");

    engine.execute(goal)?;
    let solutions = found.borrow().clone();
    Ok(solutions)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn finds_the_known_solution() {
        let _ = tracing_subscriber::fmt::try_init();

        let mut engine = SearchEngine::new();
        let digits = solve(&mut engine).unwrap().expect("puzzle has a solution");

        // 9567 + 1085 = 10652
        assert_eq!(digits, [9, 5, 6, 7, 1, 0, 8, 2]);
    }

    #[test]
    fn the_solution_is_unique() {
        let mut engine = SearchEngine::new();
        let all = solve_all(&mut engine).unwrap();
        assert_eq!(all, vec![[9, 5, 6, 7, 1, 0, 8, 2]]);
    }

    #[test]
    fn search_actually_backtracked() {
        let mut engine = SearchEngine::new();
        solve(&mut engine).unwrap();
        assert!(engine.stats().backtracks > 0);
        assert!(engine.stats().choices_applied > 0);
    }
}
