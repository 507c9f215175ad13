use crate::{expr::EvalError, lexer::LexerError, source::SourceLoc};

/// Builds an `Err((loc, AssemblerError))` with a diagnostic code.
macro_rules! asm_err {
    ($loc:expr, $code:expr, $($arg:tt)*) => {
        Err(($loc, $crate::error::AssemblerError::new($code, format!($($arg)*))))
    };
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AssemblerError {
    code: &'static str,
    message: String,
}

impl AssemblerError {
    #[inline]
    pub fn new<S: Into<String>>(code: &'static str, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[inline]
    pub fn code(&self) -> &'static str {
        self.code
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<LexerError> for (SourceLoc, AssemblerError) {
    fn from(e: LexerError) -> Self {
        (e.loc(), AssemblerError::new("Z0001", format!("{e}")))
    }
}

impl From<EvalError> for AssemblerError {
    fn from(e: EvalError) -> Self {
        AssemblerError::new(e.code(), format!("{e}"))
    }
}

pub type AsmResult<T> = Result<T, (SourceLoc, AssemblerError)>;
