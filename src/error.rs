// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Errors reported by texture loads.
//!
//! Every failure is reported to the caller of the load that caused it.  Errors are plain data
//! (`Clone + Send`) so a background worker can hand one back across its channel instead of
//! panicking.  Nothing in this crate retries; that policy belongs to the caller, who usually
//! substitutes a fallback texture.

/// The error type for every fallible operation in this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The format identifier is not in the capability table.
    #[error("Unknown format {0}")]
    UnknownFormat(String),
    /// The operation can't be performed for this texture or format, e.g. mipmap synthesis of a
    /// 3D texture or a compressed format requested from a pixel source.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// The container header is invalid or a transcode step failed.
    #[error("Decode failure: {0}")]
    DecodeFailure(String),
    /// The fetch failed or a background channel went away.
    #[error("Transport failure: {0}")]
    TransportFailure(String),
    /// The device and the file's available encodings share no compatible format.
    #[error("No supported transcode formats")]
    NoSupportedFormat,
    /// The loader was destroyed while the request was outstanding.
    #[error("Loader destroyed")]
    Destroyed,
    /// The graphics backend rejected an allocation or command.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// True for errors that originate in moving bytes around rather than in their content.
    ///
    /// Callers that implement their own retry policy generally retry only these.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::TransportFailure(_) | Error::Destroyed)
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Error::UnsupportedOperation(what.into())
    }

    pub(crate) fn decode(what: impl Into<String>) -> Self {
        Error::DecodeFailure(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn destroyed_is_transport() {
        assert!(Error::Destroyed.is_transport());
        assert!(Error::TransportFailure("gone".into()).is_transport());
        assert!(!Error::NoSupportedFormat.is_transport());
    }

    #[test]
    fn messages_are_descriptive() {
        assert_eq!(
            Error::NoSupportedFormat.to_string(),
            "No supported transcode formats"
        );
        assert_eq!(
            Error::UnknownFormat("rgb9".into()).to_string(),
            "Unknown format rgb9"
        );
    }
}
