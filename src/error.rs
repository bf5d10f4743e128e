use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Most problems met while lifting a method never surface as an [`Error`]: unsupported
/// instructions become placeholder statements and unresolvable call targets degrade to
/// function-pointer calls. The variants below describe the failures that abort the lift
/// of a single method, which [`crate::Lifter::lift`] then contains into a fault block.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Control flow that cannot be represented (e.g. jump to a missing instruction)
/// - [`Error::Empty`] - Empty instruction stream where one was required
///
/// ## Analysis Errors
/// - [`Error::GraphError`] - Block graph invariant violated
/// - [`Error::LiftFault`] - A contained fault reported for one method of a batch
///
/// # Examples
///
/// ```rust
/// use isilift::Error;
///
/// fn describe(err: &Error) -> String {
///     match err {
///         Error::Malformed { message, .. } => format!("malformed input: {message}"),
///         Error::Empty => "nothing to lift".to_string(),
///         other => other.to_string(),
///     }
/// }
///
/// assert_eq!(describe(&Error::Empty), "nothing to lift");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The instruction stream is damaged and could not be lifted.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided instruction stream was empty.
    #[error("Provided instruction stream was empty")]
    Empty,

    /// Block graph error.
    ///
    /// Raised when an edge references a block that does not exist or when a
    /// structuring step would break the graph's ownership rules.
    #[error("{0}")]
    GraphError(String),

    /// Lifting a method failed and the failure was contained.
    ///
    /// Reported by [`crate::LiftedMethod::fault`].
    #[error("Lifting {method} failed: {message}")]
    LiftFault {
        /// Display name of the method whose lift failed
        method: String,
        /// The underlying failure text
        message: String,
    },
}

/// The result type used throughout isilift.
pub type Result<T> = std::result::Result<T, Error>;
