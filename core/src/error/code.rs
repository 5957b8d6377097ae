/// Stable numeric error codes surfaced as CLI exit codes.
///
/// `2` is left free: the CLI uses it for a run that finished with `partial` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ParseError = 4,
    ValidationError = 3,
    StepNotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    ToolNotFound = 13,
    Timeout = 30,
    Cancelled = 31,
    AggregationError = 40,
    ProvenanceError = 50,
    ConfigError = 60,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
