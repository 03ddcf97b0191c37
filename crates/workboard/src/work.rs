//! Runnable units of work

/// A unit of work handed to exactly one worker and run once, synchronously.
///
/// Work produces no value and declares no error; recovering from its own
/// failures is the implementation's responsibility.
///
/// # Example
///
/// ```
/// use workboard::Work;
///
/// struct Greet(String);
///
/// impl Work for Greet {
///     fn run(self: Box<Self>) {
///         println!("hello, {}", self.0);
///     }
/// }
/// ```
pub trait Work: Send + 'static {
    /// Execute the work, consuming it
    fn run(self: Box<Self>);
}

/// Boxed work as it travels through the board's buffers
pub(crate) type Job = Box<dyn Work>;

/// Adapter running a plain closure as [`Work`]
///
/// # Example
///
/// ```
/// use workboard::{SimpleWork, Work};
///
/// let work = SimpleWork::new(|| println!("ran"));
/// Box::new(work).run();
/// ```
pub struct SimpleWork<F>(F);

impl<F> SimpleWork<F>
where
    F: FnOnce() + Send + 'static,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> From<F> for SimpleWork<F>
where
    F: FnOnce() + Send + 'static,
{
    fn from(f: F) -> Self {
        Self::new(f)
    }
}

impl<F> Work for SimpleWork<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (self.0)()
    }
}

impl<F> std::fmt::Debug for SimpleWork<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleWork").finish_non_exhaustive()
    }
}
