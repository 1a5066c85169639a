use core::error::Error;
use core::fmt::Debug;
use core::fmt::Display;

/// The Atlas error type. Any type that implements [`Error`] converts into it through
/// the blanket [`From`] impl, so it serves as a "catch all" error for applications and
/// tests. A backtrace is captured on creation and printed by the [`Debug`] output.
pub struct AtlasError {
    inner: Box<InnerAtlasError>,
}

impl AtlasError {
    /// Attempts to downcast the internal error to the given type.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.inner.error.downcast_ref::<E>()
    }

    /// Returns the backtrace captured when the error was created.
    pub fn backtrace(&self) -> &std::backtrace::Backtrace {
        &self.inner.backtrace
    }
}

/// Boxed separately so that `Result<T, AtlasError>` only costs a thin pointer.
struct InnerAtlasError {
    error: Box<dyn Error + Send + Sync + 'static>,
    backtrace: std::backtrace::Backtrace,
}

// Written as a bound on the boxed error so that `From<&str>` and `From<String>` also work.
impl<E> From<E> for AtlasError
where
    Box<dyn Error + Send + Sync + 'static>: From<E>,
{
    #[cold]
    fn from(error: E) -> Self {
        AtlasError {
            inner: Box::new(InnerAtlasError {
                error: error.into(),
                backtrace: std::backtrace::Backtrace::capture(),
            }),
        }
    }
}

impl Display for AtlasError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.inner.error)
    }
}

impl Debug for AtlasError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(f, "{:?}", self.inner.error)?;

        let backtrace = &self.inner.backtrace;
        if let std::backtrace::BacktraceStatus::Captured = backtrace.status() {
            writeln!(f, "{backtrace}")?;
        }

        Ok(())
    }
}
