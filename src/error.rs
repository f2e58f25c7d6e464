// (c) Copyright 2026 The changeset authors. All rights reserved.
use std::{error, fmt};

/// Errors returned when a buffer is misused, or when persisting it fails.
///
/// Validation failures are never reported through this type. They are recorded in the buffer's
/// error tree instead.
#[derive(Debug)]
pub enum Error {
    /// The other side of a merge is not a buffer of the same kind.
    NotABuffer,
    /// The two sides of a merge buffer different content.
    ContentMismatch,
    /// The buffer strategy does not support merging.
    MergeUnsupported,
    /// The callback passed to `prepare` did not return a JSON object.
    PrepareNotMapping,
    /// A set of keys contains both `key` and one of its dotted ancestors.
    AmbiguousSnapshot { key: String },
    /// A manually built error object lacks a required field.
    MalformedError { missing: &'static str },
    /// The key names a read-only accessor of the buffer.
    ReadOnly { key: String },
    /// The key is not in the buffer's list of writable keys.
    FilteredKey { key: String },
    /// An index write lands too far past the end of an array.
    IndexOutOfReach { key: String, len: usize },
    /// The content a node tree was built over is not a JSON object.
    NotAMapping,
    /// The content's persistence hook failed.
    Persist(Box<dyn error::Error>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotABuffer => f.write_str("cannot merge with a buffer of a different kind"),
            Error::ContentMismatch => {
                f.write_str("cannot merge buffers that are staged over different content")
            }
            Error::MergeUnsupported => f.write_str("this buffer does not support merging"),
            Error::PrepareNotMapping => f.write_str("prepare callback must return an object"),
            Error::AmbiguousSnapshot { key } => {
                write!(f, "key {key} overlaps with one of its ancestors")
            }
            Error::MalformedError { missing } => {
                write!(f, "error object is missing the {missing} field")
            }
            Error::ReadOnly { key } => write!(f, "{key} is read-only"),
            Error::FilteredKey { key } => write!(f, "{key} is not a writable key"),
            Error::IndexOutOfReach { key, len } => {
                write!(f, "index {key} is too far past the end of an array of {len}")
            }
            Error::NotAMapping => f.write_str("content must be a JSON object"),
            Error::Persist(err) => write!(f, "failed to persist content: {err}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Persist(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
