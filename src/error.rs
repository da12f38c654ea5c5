use std::backtrace::Backtrace;
pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("{0}")]
    Custom(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Inner: {inner}\n{backtrace}")]
    Inner {
        inner: Box<SearchError>,
        backtrace: Box<Backtrace>,
    },
}

impl Error {
    /// Wraps an application-level message raised inside a predicate hook.
    pub fn custom(msg: impl Into<String>) -> Self {
        SearchError::Custom(msg.into()).into()
    }
}

impl From<SearchError> for Error {
    fn from(inner: SearchError) -> Self {
        Error::Inner {
            inner: Box::new(inner),
            backtrace: Box::new(std::backtrace::Backtrace::capture()),
        }
    }
}
