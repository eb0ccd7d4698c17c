use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    /// SDK 调用失败，`code` 为厂商 SDK 返回的原始错误码
    #[error("SDK call `{op}` failed with code {code:#010x}")]
    Sdk { op: &'static str, code: u32 },

    #[error("Not connected: no downstream consumer has been attached yet")]
    NotConnected,

    #[error("Already connected: allocator suggestions must precede connection")]
    AlreadyConnected,

    #[error("Allocator negotiation failed: {0}")]
    Negotiation(#[from] NegotiationFailure),

    #[error("Media type rejected: {0}")]
    InvalidMediaType(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation not valid in the current state: {0}")]
    WrongState(&'static str),

    #[error("Command serializer is stopped")]
    SerializerStopped,

    #[error("Clock advise was cancelled")]
    Cancelled,

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Buffer 协商失败的具体原因
///
/// 协商从不静默裁剪：任何无法满足的请求都会带着双方的数值返回。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationFailure {
    #[error("buffer size {requested} is smaller than the frame size {required}")]
    BufferTooSmall { requested: usize, required: usize },

    #[error("alignment {requested} over-constrains the natural alignment {natural}")]
    AlignmentMismatch { requested: usize, natural: usize },

    #[error("prefix {requested} differs from the natural prefix {natural}")]
    PrefixMismatch { requested: usize, natural: usize },

    #[error("at least one buffer is required")]
    NoBuffers,

    #[error("allocator granted {granted} bytes x {buffers} buffers, {required} bytes required")]
    AllocatorShortfall {
        granted: usize,
        buffers: usize,
        required: usize,
    },
}

impl SourceError {
    /// 便捷构造：SDK 错误
    pub fn sdk(op: &'static str, code: u32) -> Self {
        Self::Sdk { op, code }
    }

    /// 若为 SDK 错误，返回原始错误码
    pub fn sdk_code(&self) -> Option<u32> {
        match self {
            Self::Sdk { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
