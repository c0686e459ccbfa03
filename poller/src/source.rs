//! Colaboradores externos del poller: quien responde el estado de las
//! unidades y quien las encola.

use async_trait::async_trait;
use common::{SubmitRequest, UnitId, UnitReport};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Timeout, conexión caída, 5xx... vale la pena reintentar.
    #[error("transient tracker error: {0}")]
    Transient(String),
    /// El tracker rechazó la consulta o respondió algo ilegible.
    #[error("tracker rejected request: {0}")]
    Rejected(String),
}

impl QueryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Transient(_))
    }
}

/// Servicio que informa el estado actual de un lote de unidades.
/// Los ids que no conoce simplemente no aparecen en la respuesta.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn describe(&self, ids: &[UnitId]) -> Result<Vec<UnitReport>, QueryError>;
}

/// Servicio que acepta unidades de trabajo nuevas y devuelve sus ids.
#[async_trait]
pub trait WorkSubmitter: Send + Sync {
    async fn submit(&self, request: &SubmitRequest) -> Result<Vec<UnitId>, QueryError>;
}

