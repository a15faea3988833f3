use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unknown room: {0}")]
    UnknownRoom(String),

    #[error("Unknown member: {0}")]
    UnknownMember(String),
}

pub type Result<T> = std::result::Result<T, RoomError>;
