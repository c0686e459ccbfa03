//! Estados de unidades de trabajo y su agregación en un único resultado.
//!
//! `polling_outcome` es una función de muchas variables:
//! `F: UnitStatus^k -> Outcome`, con k = número de unidades de la etapa.
//! El orden de las reglas importa:
//! 1. todas las unidades `SUCCEEDED` (y al menos una) -> `SUCCESS`
//! 2. alguna unidad `FAILED` -> `FAIL`, aunque otras sigan corriendo
//! 3. cualquier otro caso -> `IN_PROGRESS`

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Resultado de consultar una etapa. Es el contrato entre el poller y los
/// estados Choice de la máquina.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Fail,
    InProgress,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Fail, Outcome::Success, Outcome::InProgress];

    pub fn token(self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Fail => "FAIL",
            Outcome::InProgress => "IN_PROGRESS",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Estado de una unidad de trabajo según el servicio de seguimiento.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Submitted,
    Pending,
    Runnable,
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl UnitStatus {
    pub fn label(self) -> &'static str {
        match self {
            UnitStatus::Submitted => "SUBMITTED",
            UnitStatus::Pending => "PENDING",
            UnitStatus::Runnable => "RUNNABLE",
            UnitStatus::Starting => "STARTING",
            UnitStatus::Running => "RUNNING",
            UnitStatus::Succeeded => "SUCCEEDED",
            UnitStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UnitStatus::Succeeded | UnitStatus::Failed)
    }

    /// Siguiente estado en el ciclo de vida normal de una unidad.
    /// Los estados terminales no avanzan.
    pub fn advance(self) -> UnitStatus {
        match self {
            UnitStatus::Submitted => UnitStatus::Pending,
            UnitStatus::Pending => UnitStatus::Runnable,
            UnitStatus::Runnable => UnitStatus::Starting,
            UnitStatus::Starting => UnitStatus::Running,
            UnitStatus::Running => UnitStatus::Succeeded,
            terminal => terminal,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for UnitStatus {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(UnitStatus::Submitted),
            "PENDING" => Ok(UnitStatus::Pending),
            "RUNNABLE" => Ok(UnitStatus::Runnable),
            "STARTING" => Ok(UnitStatus::Starting),
            "RUNNING" => Ok(UnitStatus::Running),
            "SUCCEEDED" => Ok(UnitStatus::Succeeded),
            "FAILED" => Ok(UnitStatus::Failed),
            other => Err(SpecError::UnknownStatus(other.to_string())),
        }
    }
}

/// Reduce los estados de todas las unidades de una etapa a un `Outcome`.
///
/// Un conjunto vacío devuelve `InProgress`: "no hay unidades" no significa
/// "todas terminaron bien".
pub fn polling_outcome<'a, I>(statuses: I) -> Outcome
where
    I: IntoIterator<Item = &'a UnitStatus>,
{
    let current: HashSet<UnitStatus> = statuses.into_iter().copied().collect();

    if current.len() == 1 && current.contains(&UnitStatus::Succeeded) {
        return Outcome::Success;
    }

    if current.contains(&UnitStatus::Failed) {
        return Outcome::Fail;
    }

    Outcome::InProgress
}

#[cfg(test)]
mod tests {
    use super::*;
    use UnitStatus::*;

    #[test]
    fn todas_succeeded_es_success() {
        for k in 1..=5 {
            let statuses = vec![Succeeded; k];
            assert_eq!(polling_outcome(&statuses), Outcome::Success);
        }
    }

    #[test]
    fn un_failed_domina_sobre_el_resto() {
        assert_eq!(polling_outcome(&[Succeeded, Failed, Running]), Outcome::Fail);
        assert_eq!(polling_outcome(&[Failed]), Outcome::Fail);
        assert_eq!(
            polling_outcome(&[Submitted, Pending, Runnable, Starting, Running, Failed]),
            Outcome::Fail
        );
    }

    #[test]
    fn mezcla_sin_failed_es_in_progress() {
        assert_eq!(polling_outcome(&[Running, Pending]), Outcome::InProgress);
        assert_eq!(polling_outcome(&[Succeeded, Running]), Outcome::InProgress);
        assert_eq!(polling_outcome(&[Submitted]), Outcome::InProgress);
    }

    #[test]
    fn conjunto_vacio_es_in_progress() {
        let empty: Vec<UnitStatus> = Vec::new();
        assert_eq!(polling_outcome(&empty), Outcome::InProgress);
    }

    #[test]
    fn agregacion_es_idempotente_e_independiente_del_orden() {
        let a = [Running, Succeeded, Failed];
        let b = [Failed, Running, Succeeded];
        assert_eq!(polling_outcome(&a), polling_outcome(&a));
        assert_eq!(polling_outcome(&a), polling_outcome(&b));
    }

    #[test]
    fn tokens_serializan_en_mayusculas() {
        assert_eq!(serde_json::to_string(&Outcome::InProgress).unwrap(), "\"IN_PROGRESS\"");
        assert_eq!(serde_json::to_string(&Succeeded).unwrap(), "\"SUCCEEDED\"");
        let parsed: UnitStatus = serde_json::from_str("\"RUNNABLE\"").unwrap();
        assert_eq!(parsed, Runnable);
    }

    #[test]
    fn estado_desconocido_es_error() {
        assert_eq!(
            "ZOMBIE".parse::<UnitStatus>(),
            Err(SpecError::UnknownStatus("ZOMBIE".to_string()))
        );
        assert!(serde_json::from_str::<UnitStatus>("\"ZOMBIE\"").is_err());
        assert_eq!("FAILED".parse::<UnitStatus>(), Ok(Failed));
    }

    #[test]
    fn advance_recorre_el_ciclo_de_vida() {
        let mut s = Submitted;
        for _ in 0..10 {
            s = s.advance();
        }
        assert_eq!(s, Succeeded);
        assert_eq!(Failed.advance(), Failed);
    }
}
