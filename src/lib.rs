//! Quaero is a generic, domain-agnostic engine for backtracking search and
//! constraint programming, built on the execution machinery of a
//! resolution-based logic language.
//!
//! The engine makes no domain commitments. You write predicates (units of
//! search with user-defined choice points) and compose them; the engine
//! drives the tree, unifying logic variables, trailing every mutation, and
//! rewinding to the newest choice point whenever an alternative fails.
//!
//! # Core Concepts
//!
//! - **[`Term`]**: the data universe: a logic variable, an updatable cell,
//!   or an opaque user value (any type satisfying [`ValueEquality`]).
//! - **[`Predicate`]**: a trait with four hooks (`initialize_call`,
//!   `more_choices`, `test_choice`, and the continuation link) that every
//!   unit of search honors. [`DetPred`], [`SemiDetPred`] and [`Pred`] cover
//!   the common shapes.
//! - **Meta-predicates**: [`conjunct`], [`Disjunction`], [`Loop`], [`Once`],
//!   [`NotNot`] and [`fail`] compose predicates into executable trees.
//! - **[`SearchEngine`]**: owns the variable store and the trail, and runs a
//!   predicate tree to completion. All bindings are undone before
//!   `execute` returns, so solutions are observed from inside predicates.
//!
//! [`Term`]: search::term::Term
//! [`ValueEquality`]: search::value::ValueEquality
//! [`Predicate`]: search::pred::Predicate
//! [`DetPred`]: search::pred::DetPred
//! [`SemiDetPred`]: search::pred::SemiDetPred
//! [`Pred`]: search::pred::Pred
//! [`conjunct`]: search::meta::conjunct
//! [`Disjunction`]: search::meta::Disjunction
//! [`Loop`]: search::meta::Loop
//! [`Once`]: search::meta::Once
//! [`NotNot`]: search::meta::NotNot
//! [`fail`]: search::pred::fail
//! [`SearchEngine`]: search::engine::SearchEngine
//!
//! # Example: enumerating a variable's candidates
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use quaero::search::choice::VarChoiceIterator;
//! use quaero::search::engine::SearchEngine;
//! use quaero::search::meta::conjunct;
//! use quaero::search::pred::{fail, share, DetPred, Pred};
//! use quaero::search::term::Term;
//! use quaero::search::value::StandardValue;
//!
//! let mut engine: SearchEngine<StandardValue> = SearchEngine::new();
//! let x = engine.new_var();
//!
//! // member(x, [1, 2, 3])
//! let member = {
//!     let x = x.clone();
//!     share(Pred::new(move |_ctx| {
//!         let candidates = (1..=3).map(|i| Term::Val(StandardValue::Int(i))).collect();
//!         Ok(VarChoiceIterator::new(x.clone(), candidates).into_sequence())
//!     }))
//! };
//!
//! // Record each solution as a side effect; `fail` forces enumeration.
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let record = {
//!     let (x, seen) = (x.clone(), seen.clone());
//!     share(DetPred::new(move |ctx| {
//!         seen.borrow_mut().push(ctx.dereference(&x));
//!         Ok(())
//!     }))
//! };
//!
//! let goal = conjunct(vec![member, record, fail()]).unwrap();
//! assert!(!engine.execute(goal).unwrap());
//! assert_eq!(seen.borrow().len(), 3);
//!
//! // Everything is rewound once execute returns.
//! assert!(engine.is_var(&x));
//! ```
pub mod error;
pub mod examples;
pub mod search;
