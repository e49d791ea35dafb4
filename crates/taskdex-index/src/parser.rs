use std::error::Error as StdError;

use taskdex_core::Task;

/// Turns a file into tasks. Injected into the indexer by the host.
pub trait TaskParser {
    /// Error type bubbled up from the parser.
    type Error: StdError + 'static;

    /// Parse every task in the file at `path`.
    ///
    /// # Errors
    /// Returns a parser-specific error when the file cannot be read or parsed.
    fn parse(&self, path: &str) -> Result<Vec<Task>, Self::Error>;
}

impl<F, E> TaskParser for F
where
    F: Fn(&str) -> Result<Vec<Task>, E>,
    E: StdError + 'static,
{
    type Error = E;

    fn parse(&self, path: &str) -> Result<Vec<Task>, Self::Error> {
        self(path)
    }
}
