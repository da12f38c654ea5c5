/// The base trait for any value a term can carry.
pub trait ValueEquality: Clone + std::fmt::Debug + Eq + std::hash::Hash + 'static {}
impl<T> ValueEquality for T where T: Clone + std::fmt::Debug + Eq + std::hash::Hash + 'static {}

/// A capability trait for values that can be ordered.
pub trait ValueOrdering: ValueEquality + Ord {}
impl<T> ValueOrdering for T where T: ValueEquality + Ord {}

/// A concrete enum providing standard value kinds.
/// Problem-specific value types can compose this to reuse standard functionality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardValue {
    Int(i64),
    Bool(bool),
    Str(String),
}
