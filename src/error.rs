use std::time::Duration;

/// 组装核心的错误分类。
///
/// 数据质量问题（低可信度的簇、不一致的重叠几何、过短的重叠）不会走到这里，
/// 它们只会被丢弃或记录为警告。
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inconsistent layout path {path}: {message}")]
    Consistency { path: usize, message: String },

    #[error("graph construction did not finish within {0:?}")]
    Timeout(Duration),

    #[error("worker pool failure: {0}")]
    WorkerPool(String),

    #[error("cannot load reads: {0}")]
    Input(String),

    #[error("graph file error: {0}")]
    GraphFile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AssemblyError {
    pub fn config(msg: impl Into<String>) -> Self {
        AssemblyError::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
