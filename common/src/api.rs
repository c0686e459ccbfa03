//! Tipos del protocolo HTTP con el servicio de seguimiento de unidades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::Stage;
use crate::status::UnitStatus;
use crate::UnitId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub stage: Stage,
    /// Definición de job a ejecutar (imagen, comando, recursos...).
    pub job_definition: String,
    /// Cantidad de unidades en paralelo (p.ej. una por muestra).
    pub units: u32,
    /// Unidades que tienen que terminar bien antes de arrancar estas.
    #[serde(default)]
    pub depends_on: Vec<UnitId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_ids: Vec<UnitId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeRequest {
    pub jobs: Vec<UnitId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub job_id: UnitId,
    pub status: UnitStatus,
}

/// Registro completo de una unidad en el tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub job_id: UnitId,
    pub stage: Stage,
    pub job_definition: String,
    pub status: UnitStatus,
    #[serde(default)]
    pub depends_on: Vec<UnitId>,
    /// Fijada a mano por un operador: el tracker ya no la avanza.
    #[serde(default)]
    pub pinned: bool,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UnitInfo {
    pub fn report(&self) -> UnitReport {
        UnitReport {
            job_id: self.job_id.clone(),
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeResponse {
    pub jobs: Vec<UnitReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusOverrideRequest {
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}
