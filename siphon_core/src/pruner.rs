use crate::alphabet::Alphabet;
use crate::oracle::{Oracle, OracleError};
use tracing::{debug, info};

/// Narrows `alphabet` down to the symbols that appear somewhere in the secret.
///
/// Each symbol is probed once as `<wildcard><symbol><wildcard>`, strictly one
/// after another. The result keeps the input order. The first failed query
/// aborts the whole pass; a partially pruned alphabet is never returned.
pub async fn prune(
    oracle: &dyn Oracle,
    alphabet: &Alphabet,
    wildcard: char,
) -> Result<Alphabet, OracleError> {
    let mut kept = Vec::with_capacity(alphabet.len());
    for symbol in alphabet.iter() {
        let candidate = format!("{wildcard}{symbol}{wildcard}");
        if oracle.query(&candidate).await? {
            debug!(%symbol, "symbol present in secret");
            kept.push(symbol);
        }
    }

    let pruned = Alphabet::new(kept);
    info!(
        before = alphabet.len(),
        after = pruned.len(),
        charset = %pruned,
        "charset pruned"
    );
    Ok(pruned)
}
