//! Mapping of reqwest failures onto domain fault classes
//!
//! reqwest does not expose TLS or socket failures as distinct kinds, so the
//! source chain is inspected: an `io::Error` with a reset/abort kind is a
//! socket failure, a source mentioning TLS or certificates is a TLS failure.

use std::error::Error as StdError;
use std::io;

use firehose_domain::StreamError;

const TLS_MARKERS: [&str; 4] = ["tls", "ssl", "certificate", "handshake"];

/// Convert a reqwest error into the matching `StreamError`
pub(crate) fn classify(err: reqwest::Error) -> StreamError {
    if let Some(status) = err.status() {
        let reason = status.canonical_reason().unwrap_or("unknown status");
        return StreamError::http(status.as_u16(), reason);
    }
    if is_tls(&err) {
        return StreamError::tls(describe(&err));
    }
    if is_socket_failure(&err) || err.is_timeout() {
        return StreamError::connection(describe(&err));
    }
    if err.is_body() || err.is_decode() {
        return StreamError::incomplete_read(describe(&err));
    }
    StreamError::connection(describe(&err))
}

/// The error and all of its sources on one line
pub(crate) fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn sources<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(err.source(), |&e| e.source())
}

// The top level message embeds the URL, so only the causes are inspected.
fn is_tls(err: &(dyn StdError + 'static)) -> bool {
    sources(err).any(|cause| {
        let text = cause.to_string().to_lowercase();
        TLS_MARKERS.iter().any(|marker| text.contains(marker))
    })
}

fn is_socket_failure(err: &(dyn StdError + 'static)) -> bool {
    sources(err).any(|cause| {
        cause.downcast_ref::<io::Error>().is_some_and(|io| {
            matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
            )
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Wrapped {
        message: &'static str,
        source: Option<Box<dyn StdError + 'static>>,
    }

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.source.as_deref()
        }
    }

    #[test]
    fn test_tls_detected_in_sources_only() {
        let err = Wrapped {
            message: "error sending request for url (https://stream.example.com/tls)",
            source: Some(Box::new(Wrapped {
                message: "invalid peer certificate: UnknownIssuer",
                source: None,
            })),
        };
        assert!(is_tls(&err));

        let plain = Wrapped {
            message: "error sending request for url (https://tls.example.com/)",
            source: Some(Box::new(Wrapped {
                message: "dns error",
                source: None,
            })),
        };
        assert!(!is_tls(&plain));
    }

    #[test]
    fn test_socket_failure_detected() {
        let err = Wrapped {
            message: "error decoding response body",
            source: Some(Box::new(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
        };
        assert!(is_socket_failure(&err));
        assert_eq!(
            describe(&err),
            "error decoding response body: connection reset by peer"
        );
    }
}
