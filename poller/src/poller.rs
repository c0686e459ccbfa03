use std::collections::{HashMap, HashSet};

use common::{polling_outcome, Outcome, UnitId, UnitReport, UnitStatus};
use futures::future::try_join_all;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::source::{QueryError, StatusSource};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("status query failed: {0}")]
    Query(#[from] QueryError),
    #[error("status query for {units} units gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        units: usize,
        last: QueryError,
    },
    #[error("tracker did not report units {0:?}")]
    MissingUnits(Vec<UnitId>),
    #[error("stage {0} has no units to wait for")]
    NoUnits(String),
    #[error("stage {stage} failed: {} unit(s) FAILED", .failed.len())]
    StageFailed {
        stage: String,
        failed: Vec<UnitReport>,
    },
}

/// Foto del estado de una etapa en un chequeo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub outcome: Outcome,
    /// Un reporte por id distinto, en el orden en que se pidieron.
    pub units: Vec<UnitReport>,
}

impl StageReport {
    pub fn failed_units(&self) -> Vec<UnitReport> {
        self.units
            .iter()
            .filter(|u| u.status == UnitStatus::Failed)
            .cloned()
            .collect()
    }

    /// Cantidad de unidades por estado, para los logs.
    pub fn counts(&self) -> HashMap<UnitStatus, usize> {
        let mut counts = HashMap::new();
        for unit in &self.units {
            *counts.entry(unit.status).or_insert(0) += 1;
        }
        counts
    }
}

/// Evento que recibe el handler de polling: la lista de ids tal cual o
/// envuelta en `{"job_ids": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PollEvent {
    Ids(Vec<UnitId>),
    Wrapped { job_ids: Vec<UnitId> },
}

pub fn unit_ids_from_event(raw: &str) -> serde_json::Result<Vec<UnitId>> {
    let event: PollEvent = serde_json::from_str(raw)?;
    Ok(match event {
        PollEvent::Ids(ids) => ids,
        PollEvent::Wrapped { job_ids } => job_ids,
    })
}

/// Divide `ids` en trozos de a lo sumo `size` elementos.
pub fn split_list(ids: &[UnitId], size: usize) -> Vec<&[UnitId]> {
    ids.chunks(size.max(1)).collect()
}

/// Consulta el estado de las unidades de una etapa y lo reduce a un `Outcome`.
pub struct BatchStatusPoller<S> {
    source: S,
    config: PollConfig,
}

impl<S: StatusSource> BatchStatusPoller<S> {
    pub fn new(source: S, config: PollConfig) -> Self {
        Self { source, config }
    }

    /// Pide el estado de todas las unidades. Los trozos se consultan en
    /// paralelo; el resultado queda en el orden de `ids` sin repetidos.
    pub async fn query_statuses(&self, ids: &[UnitId]) -> Result<Vec<UnitReport>, PollError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<UnitId> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = split_list(&unique, self.config.chunk_size);
        debug!(
            "consultando {} unidades en {} trozos",
            unique.len(),
            chunks.len()
        );

        let partials = try_join_all(chunks.into_iter().map(|chunk| self.query_chunk(chunk))).await?;

        let mut by_id: HashMap<UnitId, UnitStatus> = partials
            .into_iter()
            .flatten()
            .map(|r| (r.job_id, r.status))
            .collect();

        let mut merged = Vec::with_capacity(unique.len());
        let mut missing = Vec::new();
        for id in unique {
            match by_id.remove(&id) {
                Some(status) => merged.push(UnitReport { job_id: id, status }),
                None => missing.push(id),
            }
        }

        if !missing.is_empty() {
            return Err(PollError::MissingUnits(missing));
        }
        Ok(merged)
    }

    /// Una consulta con timeout y reintentos con backoff exponencial.
    async fn query_chunk(&self, chunk: &[UnitId]) -> Result<Vec<UnitReport>, PollError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = match timeout(self.config.query_timeout, self.source.describe(chunk)).await
            {
                Ok(result) => result,
                Err(_) => Err(QueryError::Transient(format!(
                    "no response within {:?}",
                    self.config.query_timeout
                ))),
            };

            match result {
                Ok(reports) => return Ok(reports),
                Err(e) if !e.is_retryable() => return Err(PollError::Query(e)),
                Err(e) if attempt >= self.config.max_attempts => {
                    return Err(PollError::Exhausted {
                        attempts: attempt,
                        units: chunk.len(),
                        last: e,
                    })
                }
                Err(e) => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        "consulta de {} unidades falló (intento {}/{}): {}; reintento en {:?}",
                        chunk.len(),
                        attempt,
                        self.config.max_attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Un chequeo: consulta y agrega.
    pub async fn check(&self, ids: &[UnitId]) -> Result<StageReport, PollError> {
        let units = self.query_statuses(ids).await?;
        let outcome = polling_outcome(units.iter().map(|u| &u.status));
        info!("{} unidades -> {}", units.len(), outcome);
        Ok(StageReport { outcome, units })
    }

    /// Repite `check` cada `config.wait` hasta que la etapa termina.
    /// Con FAIL corta enseguida aunque queden unidades corriendo.
    pub async fn wait_for_stage(
        &self,
        stage: &str,
        ids: &[UnitId],
    ) -> Result<StageReport, PollError> {
        if ids.is_empty() {
            return Err(PollError::NoUnits(stage.to_string()));
        }

        let mut polls: u64 = 0;
        loop {
            polls += 1;
            let report = self.check(ids).await?;
            match report.outcome {
                Outcome::Success => {
                    info!("etapa {} terminó bien tras {} chequeos", stage, polls);
                    return Ok(report);
                }
                Outcome::Fail => {
                    let failed = report.failed_units();
                    warn!("etapa {} falló: {} unidades FAILED", stage, failed.len());
                    return Err(PollError::StageFailed {
                        stage: stage.to_string(),
                        failed,
                    });
                }
                Outcome::InProgress => {
                    debug!(
                        "etapa {} en curso ({:?}), espero {:?}",
                        stage,
                        report.counts(),
                        self.config.wait
                    );
                    sleep(self.config.wait).await;
                }
            }
        }
    }
}
