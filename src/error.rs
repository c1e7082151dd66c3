use miette::Diagnostic;
use thiserror::Error;

/**
 * 存储核心错误类型 - 使用 miette 提供用户友好的错误诊断
 *
 * 调用方（API 层）据此映射 HTTP 响应：NotFound -> 404, InvalidInput -> 400,
 * CorruptBlob / Database / InconsistentIndex -> 500
 */
#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    #[error("IO error: {0}")]
    #[diagnostic(code(runstore::io_error))]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    #[diagnostic(code(runstore::not_found))]
    NotFound(String),

    #[error("Invalid input: {0}")]
    #[diagnostic(
        code(runstore::invalid_input),
        help("Check that your input meets the required format and constraints")
    )]
    InvalidInput(String),

    #[error("Corrupt blob: {0}")]
    #[diagnostic(
        code(runstore::corrupt_blob),
        help("The stored payload failed to decompress or parse; check database integrity")
    )]
    CorruptBlob(String),

    #[error("Database error: {0}")]
    #[diagnostic(
        code(runstore::database_error),
        help("Check database connection and schema integrity")
    )]
    Database(String),

    /// The latest-host index references a host row that no longer exists.
    /// This is a violated invariant, not a normal runtime condition.
    #[error("Inconsistent index: {0}")]
    #[diagnostic(code(runstore::inconsistent_index))]
    InconsistentIndex(String),
}

impl StoreError {
    /**
     * 创建数据库错误
     */
    pub fn database_error(message: impl Into<String>) -> Self {
        StoreError::Database(message.into())
    }

    /**
     * 创建未找到错误
     */
    pub fn not_found(message: impl Into<String>) -> Self {
        StoreError::NotFound(message.into())
    }

    /**
     * 创建无效输入错误
     */
    pub fn invalid_input(message: impl Into<String>) -> Self {
        StoreError::InvalidInput(message.into())
    }

    /**
     * 创建损坏数据错误
     */
    pub fn corrupt_blob(message: impl Into<String>) -> Self {
        StoreError::CorruptBlob(message.into())
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, StoreError>;
