pub mod alphabet;
pub mod config;
pub mod extractor;
pub mod finder;
pub mod oracle;
pub mod progress;
pub mod pruner;
pub mod transport;

pub use alphabet::Alphabet;
pub use config::{ConfigError, SiphonConfig, Strategy};
pub use extractor::{ExtractError, ExtractionReport, ExtractionState, Extractor};
pub use finder::CharacterFinder;
pub use oracle::{HttpOracle, LocalOracle, Oracle, OracleError};
pub use progress::{LogProgress, NoOpProgress, ProgressSink, RecordingProgress};
pub use transport::{ReqwestTransport, Transport, TransportError};

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Validates `config`, builds an HTTP oracle for its target, and extracts the
/// secret.
pub async fn run(
    config: &SiphonConfig,
    progress: &dyn ProgressSink,
) -> Result<ExtractionReport, ExtractError> {
    config.validate()?;

    let transport = ReqwestTransport::new(config.target.timeout(), config.target.insecure)
        .map_err(OracleError::from)?;
    let oracle: Arc<dyn Oracle> = Arc::new(HttpOracle::new(
        config.target.clone(),
        transport,
        config.extraction.delay(),
    ));
    run_with_oracle(config, oracle, progress).await
}

/// Prunes the configured alphabet (unless disabled) and extracts against
/// `oracle`. Detached concurrent queries are awaited before this returns,
/// whatever the outcome.
pub async fn run_with_oracle(
    config: &SiphonConfig,
    oracle: Arc<dyn Oracle>,
    progress: &dyn ProgressSink,
) -> Result<ExtractionReport, ExtractError> {
    let started = Instant::now();
    let settings = &config.extraction;
    let charset = config.alphabet();
    info!(charset = %charset, strategy = settings.strategy.as_str(), "starting extraction");

    let pruned = if settings.prune {
        pruner::prune(&*oracle, &charset, settings.wildcard).await?
    } else {
        charset.clone()
    };

    let finder = CharacterFinder::new(Arc::clone(&oracle), settings.strategy, settings.wildcard);
    let mut extractor =
        Extractor::new(&finder, pruned.clone(), progress).with_max_length(settings.max_length);
    let result = extractor.extract().await;
    finder.settle().await;

    let secret = result?;
    Ok(ExtractionReport {
        secret,
        strategy: finder.strategy().as_str().to_string(),
        charset: charset.to_string(),
        pruned_charset: pruned.to_string(),
        queries: oracle.queries_issued(),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}
