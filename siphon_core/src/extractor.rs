use crate::alphabet::Alphabet;
use crate::config::ConfigError;
use crate::finder::CharacterFinder;
use crate::oracle::OracleError;
use crate::progress::ProgressSink;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Everything that can stop an extraction run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    /// A concurrent query task panicked or was torn down before answering.
    #[error("Concurrent query task aborted: {0}")]
    TaskAborted(String),
    #[error("Prefix reached the {limit}-character limit before the secret ended: {prefix}")]
    LengthCapReached { limit: usize, prefix: String },
}

/// Where an [`Extractor`] is in its run. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionState {
    Running { prefix: String },
    Done { secret: String },
    /// `partial` is what had been confirmed before the failure. It is kept for
    /// diagnostics only and is never returned as a result.
    Failed { partial: String },
}

/// Grows the secret one confirmed character at a time.
///
/// Each step asks the finder for the symbol that extends the current prefix.
/// A symbol is appended and reported to the progress sink; `None` ends the run
/// with the prefix as the secret. Nothing bounds the number of steps unless a
/// length cap is set.
pub struct Extractor<'a> {
    finder: &'a CharacterFinder,
    alphabet: Alphabet,
    progress: &'a dyn ProgressSink,
    max_length: Option<usize>,
    state: ExtractionState,
}

impl<'a> Extractor<'a> {
    pub fn new(
        finder: &'a CharacterFinder,
        alphabet: Alphabet,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            finder,
            alphabet,
            progress,
            max_length: None,
            state: ExtractionState::Running {
                prefix: String::new(),
            },
        }
    }

    /// Fails the run with [`ExtractError::LengthCapReached`] when the prefix
    /// already has `limit` characters and the finder still extends it. A
    /// secret of exactly `limit` characters completes normally.
    pub fn with_max_length(mut self, limit: Option<usize>) -> Self {
        self.max_length = limit;
        self
    }

    pub fn state(&self) -> &ExtractionState {
        &self.state
    }

    /// Advances by one finder call. Calling `step` on a terminal state is a
    /// no-op that returns the state unchanged.
    pub async fn step(&mut self) -> Result<&ExtractionState, ExtractError> {
        let running = match &self.state {
            ExtractionState::Running { prefix } => Some(prefix.clone()),
            _ => None,
        };
        let Some(prefix) = running else {
            return Ok(&self.state);
        };

        match self.finder.find_next(&prefix, &self.alphabet).await {
            Ok(Some(symbol)) => {
                if let Some(limit) = self.max_length
                    && prefix.chars().count() >= limit
                {
                    self.state = ExtractionState::Failed {
                        partial: prefix.clone(),
                    };
                    return Err(ExtractError::LengthCapReached { limit, prefix });
                }
                let mut extended = prefix;
                extended.push(symbol);
                debug!(%symbol, prefix = %extended, "character confirmed");
                self.progress.on_prefix(&extended);
                self.state = ExtractionState::Running { prefix: extended };
            }
            Ok(None) => {
                info!(secret = %prefix, "no symbol extends the prefix, extraction complete");
                self.state = ExtractionState::Done { secret: prefix };
            }
            Err(e) => {
                self.state = ExtractionState::Failed { partial: prefix };
                return Err(e);
            }
        }
        Ok(&self.state)
    }

    /// Runs until the secret is complete or a step fails.
    pub async fn extract(&mut self) -> Result<String, ExtractError> {
        loop {
            if let ExtractionState::Done { secret } = self.step().await? {
                return Ok(secret.clone());
            }
        }
    }
}

/// Summary of a finished run.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    pub secret: String,
    pub strategy: String,
    pub charset: String,
    pub pruned_charset: String,
    pub queries: u64,
    pub elapsed_ms: u64,
}
