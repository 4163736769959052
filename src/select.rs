//! Choosing a database by name.

use std::{
    collections::BTreeMap,
    io::{self, BufRead, Write},
};

use crate::DatabaseId;

/// An error raised while choosing a database.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    /// The user aborted the selection.
    #[error("Database selection cancelled")]
    Cancelled,
    /// There was nothing to choose from.
    #[error("No databases available")]
    Empty,
    /// Reading or writing the prompt failed.
    #[error("Prompt failed")]
    Io(#[from] io::Error),
}

/// Picks one database out of a `name -> id` mapping, returning its name.
///
/// Closures of the matching shape implement this trait, which makes it easy
/// to select non-interactively:
///
/// ```
/// use std::collections::BTreeMap;
///
/// use metabasic::{DatabaseId, DatabaseSelector, SelectError};
///
/// let mut pick_first = |dbs: &BTreeMap<String, DatabaseId>| -> Result<String, SelectError> {
///     dbs.keys().next().cloned().ok_or(SelectError::Empty)
/// };
///
/// let dbs = BTreeMap::from([("Sample Database".to_string(), DatabaseId(1))]);
/// assert_eq!(pick_first.select(&dbs).unwrap(), "Sample Database");
/// ```
pub trait DatabaseSelector {
    /// Choose a database from the mapping and return its name.
    fn select(&mut self, databases: &BTreeMap<String, DatabaseId>) -> Result<String, SelectError>;
}

impl<F> DatabaseSelector for F
where
    F: FnMut(&BTreeMap<String, DatabaseId>) -> Result<String, SelectError>,
{
    fn select(&mut self, databases: &BTreeMap<String, DatabaseId>) -> Result<String, SelectError> {
        self(databases)
    }
}

/// A line-oriented terminal prompt. The databases are listed with numbers,
/// and the user answers with either a number or a name. Invalid answers
/// prompt again; end of input cancels.
#[derive(Debug)]
pub struct Prompt<R, W> {
    input: R,
    output: W,
}

impl Prompt<io::StdinLock<'static>, io::Stderr> {
    /// A prompt reading from stdin and writing to stderr.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Prompt<R, W> {
    /// A prompt over arbitrary input and output.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    // Numbers pick by position when in range; anything else, including
    // out-of-range numbers, must match a name exactly.
    fn answer<'a>(names: &[&'a String], answer: &str) -> Option<&'a String> {
        let by_index = answer
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| names.get(i).copied());

        by_index.or_else(|| names.iter().copied().find(|name| name.as_str() == answer))
    }
}

impl<R: BufRead, W: Write> DatabaseSelector for Prompt<R, W> {
    fn select(&mut self, databases: &BTreeMap<String, DatabaseId>) -> Result<String, SelectError> {
        if databases.is_empty() {
            return Err(SelectError::Empty);
        }

        let names: Vec<_> = databases.keys().collect();

        writeln!(self.output, "Database:")?;
        for (i, name) in names.iter().enumerate() {
            writeln!(self.output, "  {:>2}) {name}", i + 1)?;
        }

        let mut line = String::new();
        loop {
            write!(self.output, "Select a database [1-{}]: ", names.len())?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                return Err(SelectError::Cancelled);
            }

            let answer = line.trim();
            if let Some(name) = Self::answer(&names, answer) {
                return Ok(name.clone());
            }

            writeln!(self.output, "Invalid choice: {answer:?}")?;
        }
    }
}
