//! Types for errors that can occur while reading DBD files.
use std::path::PathBuf;

/// An error that can occur while reading DBD data.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error while opening or reading a file.
    #[error("I/O error: {source} while {context}")]
    Io {
        /// The original error.
        #[source]
        source: std::io::Error,
        /// The context in which the error occurred.
        context: String,
    },
    /// An empty or malformed ASCII header.
    #[error("header error: {0}")]
    Header(String),
    /// Structurally invalid DBD contents, such as a failed known-bytes probe
    /// or a sensor whose size differs between files.
    #[error("format error: {0}")]
    Format(String),
    /// A factored file whose sensor list was not found in the cache directory.
    #[error("no sensor cache file found for CRC {crc} in '{}'", cache_dir.display())]
    CacheMiss {
        /// The sensor-list CRC referenced by the file's header.
        crc: String,
        /// The cache directory that was searched.
        cache_dir: PathBuf,
    },
    /// A malformed LZ4 frame in a compressed file.
    #[error("decompression error: {0}")]
    Decompression(String),
    /// An invalid argument was passed to a function.
    #[error("bad argument `{param_name}`: {desc}")]
    BadArgument {
        /// The name of the parameter.
        param_name: String,
        /// The description of why the argument was invalid.
        desc: String,
    },
}

/// An alias for a `Result` with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new I/O [`Error`] with the given `context`.
    pub fn io(source: std::io::Error, context: impl ToString) -> Self {
        Self::Io {
            source,
            context: context.to_string(),
        }
    }

    /// Creates a new header [`Error`].
    pub fn header(msg: impl ToString) -> Self {
        Self::Header(msg.to_string())
    }

    /// Creates a new format [`Error`].
    pub fn format(msg: impl ToString) -> Self {
        Self::Format(msg.to_string())
    }

    /// Creates a new decompression [`Error`].
    pub fn decompression(msg: impl ToString) -> Self {
        Self::Decompression(msg.to_string())
    }
}

pub(crate) fn silence_eof_error<T>(err: std::io::Error) -> std::io::Result<Option<T>> {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Ok(None)
    } else {
        Err(err)
    }
}

/// Classifies a failed read: `InvalidData` is how the LZ4 layer reports a
/// malformed frame and must keep its identity as a decompression failure;
/// everything else is ordinary I/O in the given context.
pub(crate) fn reader_error(err: std::io::Error, context: impl ToString) -> Error {
    if err.kind() == std::io::ErrorKind::InvalidData {
        Error::decompression(err.to_string())
    } else {
        Error::io(err, context)
    }
}
