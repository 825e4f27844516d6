use crate::config::TimeoutConfig;
use std::time::Duration;
use thiserror::Error;

/// Why a target URL was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    ParseError,
    MissingAuthority,
    MissingScheme,
}

/// Failure of a [`PooledClient`](crate::PooledClient) request.
///
/// The three timeout variants carry the limit that was exceeded, so callers
/// can tell a slow connect from a slow server from a saturated pool.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("cannot build request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// TCP connect did not finish within the connect timeout
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Response head or body did not finish within the read timeout
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// No connection slot was granted within the connection-request timeout
    #[error("no pooled connection available after {0:?}")]
    PoolTimeout(Duration),

    #[error("transport failure: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("TLS failure: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("cannot encode JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot encode form body: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// `reason` is diagnostic text; match on `kind`.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Scheme not permitted by the client's [`TransportSecurity`](crate::TransportSecurity).
    #[error("scheme '{scheme}' rejected: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    /// The client was closed and no longer admits requests
    #[error("HTTP client is closed")]
    Closed,
}

impl HttpError {
    /// Whether this error is one of the timeout kinds
    /// (connect, read or connection-request).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            HttpError::ConnectTimeout(_) | HttpError::ReadTimeout(_) | HttpError::PoolTimeout(_)
        )
    }

    /// Classify a hyper-util client error.
    ///
    /// An I/O `TimedOut` in the chain becomes [`HttpError::ConnectTimeout`]
    /// while connecting (TCP or TLS handshake) and [`HttpError::ReadTimeout`]
    /// afterwards. A rustls failure anywhere in the chain becomes
    /// [`HttpError::Tls`]; everything else is [`HttpError::Transport`].
    pub(crate) fn from_client_error(
        err: hyper_util::client::legacy::Error,
        timeouts: TimeoutConfig,
    ) -> Self {
        let mut tls = false;
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        while let Some(e) = current {
            // io::Error::source() skips the wrapped error itself
            tls |= e
                .downcast_ref::<std::io::Error>()
                .and_then(std::io::Error::get_ref)
                .is_some_and(|inner| inner.downcast_ref::<rustls::Error>().is_some());
            tls |= e.downcast_ref::<rustls::Error>().is_some();
            current = e.source();
        }

        if chain_timed_out(&err) {
            if err.is_connect() {
                HttpError::ConnectTimeout(timeouts.connect)
            } else {
                HttpError::ReadTimeout(timeouts.read)
            }
        } else if tls {
            HttpError::Tls(Box::new(err))
        } else {
            HttpError::Transport(Box::new(err))
        }
    }
}

/// Whether an I/O `TimedOut` appears anywhere in the source chain of `err`.
pub(crate) fn chain_timed_out(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
        {
            return true;
        }
        current = e.source();
    }
    false
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct Cause(&'static str);

    impl fmt::Display for Cause {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl Error for Cause {}

    #[test]
    fn only_timeout_variants_are_timeouts() {
        let d = Duration::from_millis(10);
        assert!(HttpError::ConnectTimeout(d).is_timeout());
        assert!(HttpError::ReadTimeout(d).is_timeout());
        assert!(HttpError::PoolTimeout(d).is_timeout());
        assert!(!HttpError::Closed.is_timeout());
        assert!(!HttpError::Transport(Box::new(Cause("reset"))).is_timeout());
        assert!(!HttpError::BodyTooLarge { limit: 1 }.is_timeout());
    }

    #[test]
    fn wrapped_causes_stay_reachable() {
        for (err, text) in [
            (HttpError::Transport(Box::new(Cause("connection refused"))), "connection refused"),
            (HttpError::Tls(Box::new(Cause("certificate expired"))), "certificate expired"),
        ] {
            let cause = err.source().and_then(|s| s.downcast_ref::<Cause>());
            assert_eq!(cause.map(|c| c.0), Some(text));
        }
    }

    #[test]
    fn timed_out_io_is_found_in_the_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "no data");
        let wrapped = HttpError::Transport(Box::new(io));
        assert!(chain_timed_out(&wrapped));

        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(!chain_timed_out(&HttpError::Transport(Box::new(refused))));
    }

    #[test]
    fn timeout_messages_name_the_limit() {
        let err = HttpError::PoolTimeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "no pooled connection available after 250ms");
    }
}
