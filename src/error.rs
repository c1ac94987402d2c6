#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device: {0}")]
    Open(String),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Enumeration error: {0}")]
    Enumeration(String),

    #[error("HidHide error: {0}")]
    HidHide(String),

    #[error("ViGEmBus error: {0}")]
    ViGEm(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Virtual controller already connected")]
    AlreadyConnected,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Platform not supported: {0}")]
    PlatformNotSupported(String),

    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
