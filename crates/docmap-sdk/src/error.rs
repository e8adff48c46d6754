use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mapping error: {0}")]
    Orm(#[from] docmap_orm::OrmError),

    #[error("store error: {0}")]
    Store(#[from] docmap_store::StoreError),
}

pub type SdkResult<T> = Result<T, SdkError>;
