use serde::Serialize;

/// Fatal problems with the identifier input. Nothing has been sent to the
/// remote endpoint when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(
        "schema error: column {column:?} not found (available columns: {})",
        available.join(", ")
    )]
    Schema {
        column: String,
        available: Vec<String>,
    },

    #[error("failed to read identifier table: {0}")]
    Read(#[from] csv::Error),
}

/// A failed lookup of a single identifier. These never abort a batch; the
/// pipeline collects them alongside the result table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("transport error for identifier {identifier:?}: {reason}")]
    Transport { identifier: String, reason: String },

    #[error("protocol error for identifier {identifier:?}: {reason}")]
    Protocol { identifier: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupErrorKind {
    Transport,
    Protocol,
}

impl LookupError {
    pub fn identifier(&self) -> &str {
        match self {
            LookupError::Transport { identifier, .. } => identifier,
            LookupError::Protocol { identifier, .. } => identifier,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            LookupError::Transport { reason, .. } => reason,
            LookupError::Protocol { reason, .. } => reason,
        }
    }

    pub fn kind(&self) -> LookupErrorKind {
        match self {
            LookupError::Transport { .. } => LookupErrorKind::Transport,
            LookupError::Protocol { .. } => LookupErrorKind::Protocol,
        }
    }
}

/// What went wrong talking to an endpoint, before we know which identifier
/// the request was for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Transport(String),
    Protocol(String),
}

impl FetchError {
    pub fn for_identifier<T: AsRef<str>>(self, identifier: T) -> LookupError {
        let identifier = identifier.as_ref().to_owned();
        match self {
            FetchError::Transport(reason) => LookupError::Transport { identifier, reason },
            FetchError::Protocol(reason) => LookupError::Protocol { identifier, reason },
        }
    }
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => {
                FetchError::Transport(format!("Got HTTP {code} ({})", response.status_text()))
            }
            ureq::Error::Transport(transport) => FetchError::Transport(transport.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchError, LookupError, LookupErrorKind, SourceError};

    #[test]
    fn test_for_identifier_works() {
        let err = FetchError::Protocol("bad json".into()).for_identifier("52010985");
        assert_eq!(err.identifier(), "52010985");
        assert_eq!(err.reason(), "bad json");
        assert_eq!(err.kind(), LookupErrorKind::Protocol);

        let err = FetchError::Transport("timed out".into()).for_identifier("1");
        assert_eq!(
            err,
            LookupError::Transport {
                identifier: "1".into(),
                reason: "timed out".into()
            }
        );
    }

    #[test]
    fn test_schema_error_message_works() {
        let err = SourceError::Schema {
            column: "viaf".into(),
            available: vec!["name".into(), "wikidata".into()],
        };
        assert_eq!(
            err.to_string(),
            "schema error: column \"viaf\" not found (available columns: name, wikidata)"
        );
    }
}
