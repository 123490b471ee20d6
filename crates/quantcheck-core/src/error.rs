use crate::shape::Shape;
use crate::variant::ProgramVariant;

/// All errors that can occur within quantcheck.
///
/// Two classes share this enum: parse errors (malformed descriptor tokens,
/// program syntax) and configuration errors (count/type mismatches, invalid
/// quantization parameters). Both are fatal to the test case they occur in
/// and are surfaced before any backend work begins. Per-backend failures are
/// *not* errors — they are data (`BackendFailure`) folded into the verdict.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed tensor descriptor token.
    #[error("invalid descriptor `{token}` at offset {offset}: {reason}")]
    InvalidDescriptor {
        token: String,
        offset: usize,
        reason: String,
    },

    /// Syntax error in a textual program.
    #[error("program syntax error at line {line}: {reason}")]
    ProgramSyntax { line: usize, reason: String },

    /// Test case supplies a different number of inputs than the program declares.
    #[error("input count mismatch: program declares {declared}, test case supplies {supplied}")]
    InputCountMismatch { declared: usize, supplied: usize },

    /// Test case expects a different number of outputs than the program declares.
    #[error("output count mismatch: program declares {declared}, test case supplies {supplied}")]
    OutputCountMismatch { declared: usize, supplied: usize },

    /// A test-case descriptor is incompatible with the program's declared type.
    #[error("{kind} {index} signature mismatch: program declares `{declared}`, test case supplies `{supplied}`")]
    SignatureMismatch {
        kind: &'static str,
        index: usize,
        declared: String,
        supplied: String,
    },

    /// The variant embedded in the program name disagrees with the test case.
    #[error("variant mismatch: program `{program}` encodes {embedded}, test case targets {requested}")]
    VariantMismatch {
        program: String,
        embedded: ProgramVariant,
        requested: ProgramVariant,
    },

    /// A quantization scale that is zero or negative (malformed fixture).
    #[error("non-positive scale {scale} at channel {channel}")]
    NonPositiveScale { channel: usize, scale: f64 },

    /// Scale and zero-point sequences must have equal length.
    #[error("quantization parameter length mismatch: {scales} scales vs {zero_points} zero points")]
    ParamLengthMismatch { scales: usize, zero_points: usize },

    /// Channel axis does not index a valid dimension.
    #[error("channel axis {axis} out of range for shape {shape}")]
    ChannelAxisOutOfRange { axis: usize, shape: Shape },

    /// More than one dimension matches the channel count; an explicit axis is required.
    #[error("ambiguous channel axis: dimensions {candidates:?} of shape {shape} all have size {channels}")]
    AmbiguousChannelAxis {
        shape: Shape,
        channels: usize,
        candidates: Vec<usize>,
    },

    /// No dimension matches the channel count.
    #[error("no dimension of shape {shape} matches {channels} quantization channels")]
    NoChannelAxis { shape: Shape, channels: usize },

    /// Element count mismatch when creating a value from a flat buffer.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Dimension index out of range for the tensor's rank.
    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// The backend set handed to the execution matrix was empty.
    #[error("backend set is empty")]
    EmptyBackendSet,

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout quantcheck.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
