use thiserror::Error;

use crate::factory::FactoryError;
use crate::fetch::FetchError;
use crate::registry::RegistryError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Factory error: {0}")]
    Factory(#[from] FactoryError),
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("Config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
