use crate::alphabet::Alphabet;
use crate::config::Strategy;
use crate::extractor::ExtractError;
use crate::oracle::{Oracle, OracleError};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Determines the character that follows a confirmed prefix.
///
/// Both strategies ask the same question for every symbol, `prefix + symbol +
/// wildcard`, and both answer `Ok(None)` when no symbol extends the prefix.
/// They differ in how the questions are scheduled:
///
/// * [`Strategy::Sequential`] walks the alphabet in order and stops at the
///   first accepted symbol. Given the same oracle it always returns the same
///   symbol.
/// * [`Strategy::Concurrent`] launches one task per symbol and returns the
///   first accepted symbol observed in real time. A failure observed before
///   any acceptance is returned; once a symbol has been accepted, later
///   failures are ignored.
///
/// Concurrent queries that lose the race are not cancelled. Their handles are
/// kept so that [`CharacterFinder::settle`] can wait for them before the run
/// ends.
pub struct CharacterFinder {
    oracle: Arc<dyn Oracle>,
    strategy: Strategy,
    wildcard: char,
    stragglers: Mutex<Vec<JoinHandle<()>>>,
}

impl CharacterFinder {
    pub fn new(oracle: Arc<dyn Oracle>, strategy: Strategy, wildcard: char) -> Self {
        Self {
            oracle,
            strategy,
            wildcard,
            stragglers: Mutex::new(Vec::new()),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub async fn find_next(
        &self,
        prefix: &str,
        alphabet: &Alphabet,
    ) -> Result<Option<char>, ExtractError> {
        match self.strategy {
            Strategy::Sequential => self.find_sequential(prefix, alphabet).await,
            Strategy::Concurrent => self.find_concurrent(prefix, alphabet).await,
        }
    }

    fn candidate(&self, prefix: &str, symbol: char) -> String {
        format!("{prefix}{symbol}{}", self.wildcard)
    }

    async fn find_sequential(
        &self,
        prefix: &str,
        alphabet: &Alphabet,
    ) -> Result<Option<char>, ExtractError> {
        for symbol in alphabet.iter() {
            if self.oracle.query(&self.candidate(prefix, symbol)).await? {
                return Ok(Some(symbol));
            }
        }
        Ok(None)
    }

    async fn find_concurrent(
        &self,
        prefix: &str,
        alphabet: &Alphabet,
    ) -> Result<Option<char>, ExtractError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<(char, Result<bool, OracleError>)>();
        let mut handles = Vec::with_capacity(alphabet.len());

        for symbol in alphabet.iter() {
            let oracle = Arc::clone(&self.oracle);
            let candidate = self.candidate(prefix, symbol);
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let verdict = oracle.query(&candidate).await;
                // Once a winner is picked the receiver is gone and this is a no-op.
                if tx.send((symbol, verdict)).is_err() {
                    trace!(%symbol, "late verdict discarded");
                }
            }));
        }
        drop(tx);

        let mut outstanding = alphabet.len();
        let mut outcome: Option<Result<Option<char>, ExtractError>> = None;

        while let Some((symbol, verdict)) = rx.recv().await {
            outstanding -= 1;
            match verdict {
                Ok(true) => {
                    outcome = Some(Ok(Some(symbol)));
                    break;
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(%symbol, error = %e, "query failed before any symbol was accepted");
                    outcome = Some(Err(e.into()));
                    break;
                }
            }
        }
        drop(rx);

        let outcome = match outcome {
            Some(outcome) => outcome,
            None if outstanding == 0 => Ok(None),
            // Every sender is gone but not every verdict arrived: a task died.
            None => Err(ExtractError::TaskAborted(format!(
                "{outstanding} concurrent queries ended without a verdict"
            ))),
        };

        self.detach(handles);
        outcome
    }

    fn detach(&self, handles: Vec<JoinHandle<()>>) {
        match self.stragglers.lock() {
            Ok(mut stragglers) => {
                stragglers.retain(|handle| !handle.is_finished());
                stragglers.extend(handles.into_iter().filter(|handle| !handle.is_finished()));
            }
            Err(poisoned) => {
                warn!("straggler list poisoned, recovering");
                let mut stragglers = poisoned.into_inner();
                stragglers.extend(handles);
            }
        }
    }

    /// Number of detached queries that have not finished yet.
    pub fn in_flight(&self) -> usize {
        match self.stragglers.lock() {
            Ok(stragglers) => stragglers.iter().filter(|h| !h.is_finished()).count(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .filter(|h| !h.is_finished())
                .count(),
        }
    }

    /// Waits for every detached query to finish so none outlives the run.
    pub async fn settle(&self) {
        let pending = match self.stragglers.lock() {
            Ok(mut stragglers) => std::mem::take(&mut *stragglers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if pending.is_empty() {
            return;
        }

        debug!(count = pending.len(), "waiting for detached queries");
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "detached query task did not complete cleanly");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::LocalOracle;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Per-candidate scripted answers, each with its own delay.
    struct ScriptedOracle {
        answers: HashMap<String, (Duration, Option<bool>)>,
        issued: AtomicU64,
    }

    impl ScriptedOracle {
        fn new(script: &[(&str, u64, Option<bool>)]) -> Self {
            let answers = script
                .iter()
                .map(|(candidate, delay_ms, verdict)| {
                    (
                        candidate.to_string(),
                        (Duration::from_millis(*delay_ms), *verdict),
                    )
                })
                .collect();
            Self {
                answers,
                issued: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn query(&self, candidate: &str) -> Result<bool, OracleError> {
            self.issued.fetch_add(1, Ordering::SeqCst);
            let (delay, verdict) = self
                .answers
                .get(candidate)
                .cloned()
                .unwrap_or((Duration::ZERO, Some(false)));
            tokio::time::sleep(delay).await;
            verdict.ok_or_else(|| {
                OracleError::Transport(TransportError::Request {
                    url: "http://target/".to_string(),
                    message: format!("reset while probing {candidate}"),
                })
            })
        }

        fn queries_issued(&self) -> u64 {
            self.issued.load(Ordering::SeqCst)
        }
    }

    fn make_finder(oracle: Arc<dyn Oracle>, strategy: Strategy) -> CharacterFinder {
        CharacterFinder::new(oracle, strategy, '*')
    }

    #[tokio::test]
    async fn sequential_returns_alphabet_first_accepted_symbol() {
        let oracle = Arc::new(ScriptedOracle::new(&[
            ("b*", 0, Some(true)),
            ("c*", 0, Some(true)),
        ]));
        let finder = make_finder(oracle.clone(), Strategy::Sequential);
        let alphabet = Alphabet::from("abc");

        for _ in 0..3 {
            assert_eq!(finder.find_next("", &alphabet).await.unwrap(), Some('b'));
        }
        // "a*" and "b*" each round, never "c*".
        assert_eq!(oracle.queries_issued(), 6);
    }

    #[tokio::test]
    async fn sequential_stops_at_first_failure() {
        let oracle = Arc::new(ScriptedOracle::new(&[
            ("a*", 0, None),
            ("b*", 0, Some(true)),
        ]));
        let finder = make_finder(oracle.clone(), Strategy::Sequential);
        let result = finder.find_next("", &Alphabet::from("ab")).await;
        assert!(matches!(result, Err(ExtractError::Oracle(_))));
        assert_eq!(oracle.queries_issued(), 1);
    }

    #[tokio::test]
    async fn strategies_agree_on_unique_answer() {
        for strategy in [Strategy::Sequential, Strategy::Concurrent] {
            let oracle: Arc<dyn Oracle> = Arc::new(LocalOracle::new("a5", '*'));
            let finder = make_finder(oracle, strategy);
            let alphabet = Alphabet::from("a5");

            assert_eq!(finder.find_next("", &alphabet).await.unwrap(), Some('a'));
            assert_eq!(finder.find_next("a", &alphabet).await.unwrap(), Some('5'));
            assert_eq!(finder.find_next("a5", &alphabet).await.unwrap(), None);
            finder.settle().await;
        }
    }

    #[tokio::test]
    async fn concurrent_returns_first_hit_without_waiting_for_slow_queries() {
        let oracle = Arc::new(ScriptedOracle::new(&[
            ("x*", 300, Some(false)),
            ("y*", 10, Some(true)),
            ("z*", 300, Some(false)),
        ]));
        let finder = make_finder(oracle.clone(), Strategy::Concurrent);

        let started = std::time::Instant::now();
        let found = finder.find_next("", &Alphabet::from("xyz")).await.unwrap();
        assert_eq!(found, Some('y'));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(finder.in_flight(), 2);

        finder.settle().await;
        assert_eq!(finder.in_flight(), 0);
        assert_eq!(oracle.queries_issued(), 3);
    }

    #[tokio::test]
    async fn concurrent_success_takes_precedence_over_later_failure() {
        let oracle = Arc::new(ScriptedOracle::new(&[
            ("p*", 10, Some(true)),
            ("q*", 150, None),
        ]));
        let finder = make_finder(oracle, Strategy::Concurrent);
        let found = finder.find_next("", &Alphabet::from("pq")).await.unwrap();
        assert_eq!(found, Some('p'));
        finder.settle().await;
    }

    #[tokio::test]
    async fn concurrent_failure_before_any_success_is_surfaced() {
        let oracle = Arc::new(ScriptedOracle::new(&[
            ("p*", 150, Some(true)),
            ("q*", 10, None),
        ]));
        let finder = make_finder(oracle, Strategy::Concurrent);
        let result = finder.find_next("", &Alphabet::from("pq")).await;
        assert!(matches!(result, Err(ExtractError::Oracle(_))));
        finder.settle().await;
    }

    #[tokio::test]
    async fn concurrent_all_rejected_is_none_not_error() {
        let oracle = Arc::new(ScriptedOracle::new(&[
            ("ka*", 5, Some(false)),
            ("kb*", 20, Some(false)),
        ]));
        let finder = make_finder(oracle, Strategy::Concurrent);
        let found = finder.find_next("k", &Alphabet::from("ab")).await.unwrap();
        assert_eq!(found, None);
        assert_eq!(finder.in_flight(), 0);
    }

    #[tokio::test]
    async fn empty_alphabet_finds_nothing() {
        for strategy in [Strategy::Sequential, Strategy::Concurrent] {
            let oracle: Arc<dyn Oracle> = Arc::new(LocalOracle::new("abc", '*'));
            let finder = make_finder(oracle, strategy);
            assert_eq!(
                finder.find_next("", &Alphabet::from("")).await.unwrap(),
                None
            );
        }
    }
}
