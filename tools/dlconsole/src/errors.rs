use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("launch failed: {0}")]
    Launch(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("settings error: {0}")]
    Settings(String),
}
