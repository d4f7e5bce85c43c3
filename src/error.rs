//! Crate-wide error value.
//!
//! Every failure carries an [`ErrorKind`] (which bucket of the taxonomy it
//! belongs to), a process exit code and a message meant for the user.

/// Error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreadable or malformed input/observation file.
    File,
    /// Invalid run configuration (no model, bad bounds, missing files).
    Configuration,
    /// Engine failure for one variant.
    Fit,
    /// Programming error: the result registry lost one of its invariants.
    RegistryInvariant,
    /// Terminal, filesystem or other environment failure.
    Io,
}

impl ErrorKind {
    fn exit_code(self) -> u8 {
        match self {
            ErrorKind::File | ErrorKind::Configuration => 2,
            ErrorKind::Fit => 3,
            ErrorKind::Io => 4,
            ErrorKind::RegistryInvariant => 5,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            exit_code: kind.exit_code(),
            message: message.into(),
        }
    }

    pub fn file(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::File, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn fit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fit, message)
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RegistryInvariant, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_kind() {
        assert_eq!(AppError::file("x").exit_code(), 2);
        assert_eq!(AppError::config("x").exit_code(), 2);
        assert_eq!(AppError::fit("x").exit_code(), 3);
        assert_eq!(AppError::io("x").exit_code(), 4);
        assert_eq!(AppError::registry("x").exit_code(), 5);
        assert_eq!(AppError::fit("boom").to_string(), "boom");
    }
}
