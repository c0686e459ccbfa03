// tracker/src/state.rs

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use common::{SubmitRequest, UnitId, UnitInfo, UnitReport, UnitStatus};
use thiserror::Error;

pub const DEFAULT_MAX_DESCRIBE: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("units must be at least 1")]
    NoUnits,
    #[error("at most {max} ids per describe request, got {got}")]
    TooManyIds { max: usize, got: usize },
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
    #[error("unknown dependency {0}")]
    UnknownDependency(UnitId),
}

/// Tracker de desarrollo: todo vive en memoria y no se poda nunca; reiniciar
/// el proceso limpia las unidades.
#[derive(Clone)]
pub struct AppState {
    pub units: Arc<Mutex<HashMap<UnitId, UnitInfo>>>,
    // orden de alta, para listar y avanzar siempre igual
    pub order: Arc<Mutex<Vec<UnitId>>>,
    pub max_describe: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DESCRIBE)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Un panic con el lock tomado no deja el mapa a medio escribir.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AppState {
    pub fn new(max_describe: usize) -> Self {
        Self {
            units: Arc::new(Mutex::new(HashMap::new())),
            order: Arc::new(Mutex::new(Vec::new())),
            max_describe: max_describe.max(1),
        }
    }

    /// Da de alta `units` unidades nuevas en SUBMITTED.
    pub fn submit(&self, req: SubmitRequest) -> Result<Vec<UnitId>, TrackerError> {
        if req.units == 0 {
            return Err(TrackerError::NoUnits);
        }

        let mut units = lock(&self.units);
        if let Some(dep) = req.depends_on.iter().find(|d| !units.contains_key(*d)) {
            return Err(TrackerError::UnknownDependency(dep.clone()));
        }

        let now = Utc::now();
        let ids: Vec<UnitId> = (0..req.units)
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();

        for id in &ids {
            units.insert(
                id.clone(),
                UnitInfo {
                    job_id: id.clone(),
                    stage: req.stage,
                    job_definition: req.job_definition.clone(),
                    status: UnitStatus::Submitted,
                    depends_on: req.depends_on.clone(),
                    pinned: false,
                    submitted_at: now,
                    updated_at: now,
                },
            );
        }
        drop(units);

        lock(&self.order).extend(ids.iter().cloned());
        Ok(ids)
    }

    /// Estado de cada id conocido, en el orden pedido. Los desconocidos se omiten.
    pub fn describe(&self, ids: &[UnitId]) -> Result<Vec<UnitReport>, TrackerError> {
        if ids.len() > self.max_describe {
            return Err(TrackerError::TooManyIds {
                max: self.max_describe,
                got: ids.len(),
            });
        }

        let units = lock(&self.units);
        Ok(ids
            .iter()
            .filter_map(|id| units.get(id).map(UnitInfo::report))
            .collect())
    }

    pub fn unit(&self, id: &str) -> Option<UnitInfo> {
        lock(&self.units).get(id).cloned()
    }

    /// Fija el estado de una unidad; el monitor ya no la toca.
    pub fn pin_status(&self, id: &str, status: UnitStatus) -> Result<UnitInfo, TrackerError> {
        let mut units = lock(&self.units);
        let unit = units
            .get_mut(id)
            .ok_or_else(|| TrackerError::UnknownUnit(id.to_string()))?;
        unit.status = status;
        unit.pinned = true;
        unit.updated_at = Utc::now();
        Ok(unit.clone())
    }

    /// Un tick: cada unidad no terminal y no fijada avanza un paso.
    /// - PENDING espera a que todas sus dependencias estén SUCCEEDED.
    /// - Si alguna dependencia está FAILED, la unidad pasa a FAILED.
    ///
    /// Las dependencias se evalúan contra el estado de antes del tick.
    /// Devuelve las transiciones hechas.
    pub fn advance_all(&self) -> Vec<(UnitId, UnitStatus, UnitStatus)> {
        let order = lock(&self.order).clone();
        let mut units = lock(&self.units);

        let before: HashMap<UnitId, UnitStatus> = units
            .iter()
            .map(|(id, u)| (id.clone(), u.status))
            .collect();

        let now = Utc::now();
        let mut changes = Vec::new();

        for id in order {
            let Some(unit) = units.get_mut(&id) else {
                continue;
            };
            if unit.pinned || unit.status.is_terminal() {
                continue;
            }

            let dep_status = |d: &UnitId| before.get(d).copied();
            let dep_failed = unit
                .depends_on
                .iter()
                .any(|d| dep_status(d) == Some(UnitStatus::Failed));
            let deps_done = unit
                .depends_on
                .iter()
                .all(|d| dep_status(d) == Some(UnitStatus::Succeeded));

            let next = if dep_failed {
                UnitStatus::Failed
            } else if unit.status == UnitStatus::Pending && !deps_done {
                UnitStatus::Pending
            } else {
                unit.status.advance()
            };

            if next != unit.status {
                changes.push((id.clone(), unit.status, next));
                unit.status = next;
                unit.updated_at = now;
            }
        }

        changes
    }
}
