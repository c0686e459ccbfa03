//! Errores de construcción del grafo y de la frontera de estados.
//!
//! Todos son errores de programación/configuración: se reportan antes de
//! enviar nada al ejecutor y nunca se reintentan.

use thiserror::Error;

use crate::StateName;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// Un nodo no cumple su contrato (p.ej. un Task sin `Next` ni `End`).
    #[error("invalid node '{name}': {reason}")]
    InvalidNode { name: StateName, reason: String },

    /// El valor de un predicado no corresponde a su categoría.
    #[error("{operator} requires a {expected} value, got {found}")]
    TypeMismatch {
        operator: String,
        expected: &'static str,
        found: String,
    },

    /// Una transición apunta a un estado que no existe en el grafo.
    #[error("state '{from}' references unknown state '{to}'")]
    DanglingReference { from: StateName, to: StateName },

    #[error("duplicate state name '{0}'")]
    DuplicateState(StateName),

    #[error("start state '{0}' is not part of the machine")]
    MissingStart(StateName),

    #[error("invalid entry point '{entry_point}': {reason}")]
    InvalidEntryPoint { entry_point: String, reason: String },

    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    /// El catálogo de recursos no se pudo leer.
    #[error("invalid resources: {0}")]
    InvalidResources(String),

    /// Estado de unidad fuera del vocabulario conocido.
    #[error("unknown unit status '{0}'")]
    UnknownStatus(String),
}

pub type SpecResult<T> = Result<T, SpecError>;
