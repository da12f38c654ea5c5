//! The 3x3 magic square: place 1..9 so that every row, column and diagonal
//! sums to 15.
//!
//! The eight line constraints live in updatable cells holding a compound
//! user value ([`MsValue::Sum`]). Each accepted placement simplifies the
//! constraints in `test_choice`: ground cells are folded into the remaining
//! total, a line with one open cell forces it, and the rewrites are trailed
//! so backtracking restores the previous constraint states.

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
};

const MAGIC_SUM: i64 = 15;

/// Value universe for the puzzle: digits, plus live sum constraints stored
/// in updatable cells.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MsValue {
    Int(i64),
    /// A line constraint: the cells still unassigned and the total they
    /// must still account for. A solved line becomes `Sum { [], 0 }`.
    Sum {
        cells: Vec<Term<MsValue>>,
        remaining: i64,
    },
}

/// A solved grid, row-major.
pub type Square = [[i64; 3]; 3];

fn int(i: i64) -> Term<MsValue> {
    Term::Val(MsValue::Int(i))
}

fn solved() -> Term<MsValue> {
    Term::Val(MsValue::Sum {
        cells: Vec::new(),
        remaining: 0,
    })
}

fn ground_int(ctx: &SearchContext<MsValue>, t: &Term<MsValue>) -> Option<i64> {
    match ctx.dereference(t) {
        Term::Val(MsValue::Int(i)) => Some(i),
        _ => None,
    }
}

/// All-different digits 1..9.
#[derive(Debug)]
struct CellPolicy {
    peers: RefCell<Vec<Term<MsValue>>>,
}

impl VarPolicy<MsValue> for CellPolicy {
    fn check_bind(&self, value: &Term<MsValue>, ctx: &SearchContext<MsValue>) -> bool {
        let Term::Val(MsValue::Int(n)) = value else {
            return false;
        };
        (1..=9).contains(n)
            && !self
                .peers
                .borrow()
                .iter()
                .any(|peer| ctx.dereference(peer) == *value)
    }

    fn choices(&self, ctx: &SearchContext<MsValue>) -> Vec<Term<MsValue>> {
        let taken: Vec<Term<MsValue>> = self
            .peers
            .borrow()
            .iter()
            .map(|peer| ctx.dereference(peer))
            .collect();
        (1..=9)
            .map(int)
            .filter(|candidate| !taken.contains(candidate))
            .collect()
    }
}

/// Checks and simplifies the line constraints until nothing more follows.
/// Returns `false` iff some line became unsatisfiable.
fn check_constraints(ctx: &mut SearchContext<MsValue>, constraints: &[Term<MsValue>]) -> bool {
    let mut progress = true;
    while progress {
        progress = false;
        for constraint in constraints {
            let Some(Term::Val(MsValue::Sum { cells, remaining })) = ctx.value(constraint) else {
                continue;
            };
            if cells.is_empty() && remaining == 0 {
                continue;
            }
            let mut open = Vec::new();
            let mut rest = remaining;
            for cell in &cells {
                match ground_int(ctx, cell) {
                    Some(n) => rest -= n,
                    None => open.push(ctx.dereference(cell)),
                }
            }
            if open.is_empty() {
                if rest != 0 {
                    return false;
                }
                ctx.unify(constraint, &solved());
                continue;
            }
            if rest < 0 {
                return false;
            }
            if open.len() == 1 {
                // The line is determined up to its last cell.
                progress = true;
                if !ctx.unify(&open[0], &int(rest)) {
                    return false;
                }
                ctx.unify(constraint, &solved());
            } else if rest != remaining {
                progress = true;
                ctx.unify(
                    constraint,
                    &Term::Val(MsValue::Sum {
                        cells: open,
                        remaining: rest,
                    }),
                );
            }
        }
    }
    true
}

/// Places a digit into one open cell, then simplifies the constraints.
struct PlacePred {
    cell: Term<MsValue>,
    constraints: Rc<Vec<Term<MsValue>>>,
    choices: Option<ChoiceSequence<MsValue>>,
    continuation: Option<PredRef<MsValue>>,
}

impl std::fmt::Debug for PlacePred {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacePred")
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}

impl Predicate<MsValue> for PlacePred {
    fn initialize_call(&mut self, ctx: &mut SearchContext<MsValue>) -> Result<bool> {
        self.choices =
            Some(VarChoiceIterator::from_policy(ctx, self.cell.clone()).into_sequence());
        Ok(true)
    }

    fn more_choices(&mut self, ctx: &mut SearchContext<MsValue>) -> Result<Retry<MsValue>> {
        apply_next(self.choices.as_mut(), ctx)
    }

    fn test_choice(&mut self, ctx: &mut SearchContext<MsValue>) -> Result<bool> {
        Ok(check_constraints(ctx, &self.constraints))
    }

    fn continuation(&self) -> Option<PredRef<MsValue>> {
        self.continuation.clone()
    }

    fn set_continuation(&mut self, cont: Option<PredRef<MsValue>>) {
        self.continuation = cont;
    }

    fn name(&self) -> &'static str {
        "place"
    }
}

#[derive(Debug)]
struct PlaceFactory {
    cells: Vec<Term<MsValue>>,
    constraints: Rc<Vec<Term<MsValue>>>,
}

impl LoopBodyFactory<MsValue> for PlaceFactory {
    fn loop_continues(&mut self, ctx: &mut SearchContext<MsValue>) -> Result<bool> {
        Ok(self.cells.iter().any(|cell| ctx.is_var(cell)))
    }

    fn make_body_pred(&mut self, ctx: &mut SearchContext<MsValue>) -> PredRef<MsValue> {
        let cell = self
            .cells
            .iter()
            .find(|cell| ctx.is_var(cell))
            .cloned()
            .expect("loop_continues reported an open cell");
        share(PlacePred {
            cell,
            constraints: self.constraints.clone(),
            choices: None,
            continuation: None,
        })
    }
}

/// The first solution found, if any.
pub fn solve_first(engine: &mut SearchEngine<MsValue>) -> Result<Option<Square>> {
    let squares = solve_inner(engine, true)?;
    Ok(squares.into_iter().next())
}

/// Every solution; the 3x3 square has the eight symmetries of one grid.
pub fn solve_all(engine: &mut SearchEngine<MsValue>) -> Result<Vec<Square>> {
    solve_inner(engine, false)
}

fn solve_inner(engine: &mut SearchEngine<MsValue>, first_only: bool) -> Result<Vec<Square>> {
    let policies: Vec<Rc<CellPolicy>> = (0..9)
        .map(|_| {
            Rc::new(CellPolicy {
                peers: RefCell::new(Vec::new()),
            })
        })
        .collect();
    let cells: Vec<Term<MsValue>> = policies
        .iter()
        .map(|policy| engine.new_var_with_policy(policy.clone()))
        .collect();
    for policy in &policies {
        *policy.peers.borrow_mut() = cells.clone();
    }

    let lines: [[usize; 3]; 8] = [
        [0, 1, 2],
        [3, 4, 5],
        [6, 7, 8],
        [0, 3, 6],
        [1, 4, 7],
        [2, 5, 8],
        [0, 4, 8],
        [2, 4, 6],
    ];
    let constraints: Rc<Vec<Term<MsValue>>> = Rc::new(
        lines
            .iter()
            .map(|line| {
                engine.new_updatable(Term::Val(MsValue::Sum {
                    cells: line.iter().map(|i| cells[*i].clone()).collect(),
                    remaining: MAGIC_SUM,
                }))
            })
            .collect(),
    );

    let found: Rc<RefCell<Vec<Square>>> = Rc::new(RefCell::new(Vec::new()));
    let record = {
        let (cells, found) = (cells.clone(), found.clone());
        share(DetPred::new(move |ctx| {
            let mut square = [[0i64; 3]; 3];
            for (i, cell) in cells.iter().enumerate() {
                square[i / 3][i % 3] = ground_int(ctx, cell)
                    .ok_or_else(|| Error::custom("open cell at solution"))?;
            }
            found.borrow_mut().push(square);
            Ok(())
        }))
    };

    let place = Loop::new(Box::new(PlaceFactory {
        cells,
        constraints,
    }));
    let goal = if first_only {
        conjunct(vec![place, record])
    } else {
        conjunct(vec![place, record, fail()])
    }
    .expect("goal list is not empty");

    engine.execute(goal)?;
    let squares = found.borrow().clone();
    Ok(squares)
}
