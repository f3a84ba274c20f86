use crate::config::{CANDIDATE_PLACEHOLDER, TargetSettings, USERNAME_PLACEHOLDER};
use crate::transport::{Transport, TransportError, TransportRequest};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const NEXT_ACTION_HEADER: &str = "Next-Action";

#[derive(Error, Debug)]
pub enum OracleError {
    /// The query could not be assembled. Fatal to the whole run.
    #[error("Malformed oracle request: {0}")]
    Request(String),
    /// The query was sent but no verdict came back.
    #[error("Oracle transport failure: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for OracleError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Build(msg) => OracleError::Request(msg),
            other => OracleError::Transport(other),
        }
    }
}

/// A black box that answers one yes/no question per query: is `candidate`
/// (wildcards included) accepted?
///
/// Implementations must be shareable across tasks, since the concurrent finder
/// fans the same oracle out to one task per symbol.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn query(&self, candidate: &str) -> Result<bool, OracleError>;

    /// Number of queries issued so far.
    fn queries_issued(&self) -> u64;
}

/// A single oracle question, built fresh for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleQuery<'a> {
    pub candidate: &'a str,
    pub endpoint: &'a str,
    pub username: &'a str,
    pub next_action: Option<&'a str>,
    pub payload_template: &'a str,
    pub expected_status: u16,
}

impl<'a> OracleQuery<'a> {
    pub fn new(target: &'a TargetSettings, candidate: &'a str) -> Self {
        Self {
            candidate,
            endpoint: &target.url,
            username: &target.username,
            next_action: target.next_action.as_deref(),
            payload_template: &target.payload_template,
            expected_status: target.success_code,
        }
    }

    /// Form body with the username and candidate substituted in verbatim. No
    /// percent-encoding is applied: the target expects the raw filter text.
    pub fn form_body(&self) -> String {
        self.payload_template
            .replace(USERNAME_PLACEHOLDER, self.username)
            .replace(CANDIDATE_PLACEHOLDER, self.candidate)
    }

    pub fn to_request(&self) -> TransportRequest {
        let mut headers = vec![("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string())];
        if let Some(action) = self.next_action {
            headers.push((NEXT_ACTION_HEADER.to_string(), action.to_string()));
        }
        TransportRequest {
            method: "POST".to_string(),
            url: self.endpoint.to_string(),
            body: self.form_body(),
            headers,
        }
    }

    pub fn verdict(&self, status: u16) -> bool {
        status == self.expected_status
    }
}

/// Oracle backed by a remote login endpoint.
///
/// Every query sleeps for `delay` after the transport returns, whether it
/// succeeded or not.
pub struct HttpOracle<T: Transport> {
    target: TargetSettings,
    transport: T,
    delay: Duration,
    issued: AtomicU64,
}

impl<T: Transport> HttpOracle<T> {
    pub fn new(target: TargetSettings, transport: T, delay: Duration) -> Self {
        Self {
            target,
            transport,
            delay,
            issued: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl<T: Transport> Oracle for HttpOracle<T> {
    async fn query(&self, candidate: &str) -> Result<bool, OracleError> {
        let query = OracleQuery::new(&self.target, candidate);
        let request = query.to_request();
        self.issued.fetch_add(1, Ordering::Relaxed);

        let outcome = self.transport.send(&request).await;
        tokio::time::sleep(self.delay).await;

        let status = outcome?;
        let accepted = query.verdict(status);
        debug!(candidate, status, accepted, "oracle verdict");
        Ok(accepted)
    }

    fn queries_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

/// In-process oracle that evaluates candidates as LDAP-style substring
/// filters against a known secret. `wildcard` matches any run of characters,
/// including none.
///
/// Useful for dry runs and for exercising the extraction engine without a
/// target.
#[derive(Debug)]
pub struct LocalOracle {
    secret: String,
    wildcard: char,
    latency: Duration,
    issued: AtomicU64,
}

impl LocalOracle {
    pub fn new(secret: impl Into<String>, wildcard: char) -> Self {
        Self {
            secret: secret.into(),
            wildcard,
            latency: Duration::ZERO,
            issued: AtomicU64::new(0),
        }
    }

    /// Simulated round-trip time applied to every query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn accepts(&self, candidate: &str) -> bool {
        wildcard_match(candidate, &self.secret, self.wildcard)
    }
}

#[async_trait]
impl Oracle for LocalOracle {
    async fn query(&self, candidate: &str) -> Result<bool, OracleError> {
        self.issued.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let accepted = self.accepts(candidate);
        trace!(candidate, accepted, "local verdict");
        Ok(accepted)
    }

    fn queries_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

/// Matches `value` against `pattern`, where `wildcard` stands for any
/// (possibly empty) sequence of characters and every other character must
/// match literally.
pub fn wildcard_match(pattern: &str, value: &str, wildcard: char) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut p, mut v) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while v < value.len() {
        if p < pattern.len() && pattern[p] == wildcard {
            backtrack = Some((p, v));
            p += 1;
        } else if p < pattern.len() && pattern[p] == value[v] {
            p += 1;
            v += 1;
        } else if let Some((star_p, star_v)) = backtrack {
            p = star_p + 1;
            v = star_v + 1;
            backtrack = Some((star_p, star_v + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == wildcard)
}
