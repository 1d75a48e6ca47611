//! Codegen errors.
//!
//! User-visible problems (stack too deep, unsupported constructs) are
//! reported through the diagnostics sink; `CompileError` covers the internal
//! abort path only.

use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("assembly error: {0}")]
    Assembly(#[from] vela_asm::AsmError),

    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn internal(message: impl Into<String>) -> Self {
        CompileError::Internal(message.into())
    }
}
