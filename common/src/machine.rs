//! Máquina de estados completa: estado inicial + colección plana de nodos.
//!
//! `StateMachine::new` valida el grafo antes de devolverlo, así que cualquier
//! máquina que exista es cerrada: todas las transiciones apuntan a estados
//! presentes y el inicio también existe.

use std::collections::HashSet;

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::{SpecError, SpecResult};
use crate::states::{Record, State};
use crate::StateName;

#[derive(Debug, Clone, PartialEq)]
pub struct StateMachine {
    name: String,
    comment: String,
    start_at: StateName,
    states: Vec<State>,
}

impl StateMachine {
    pub fn new(
        name: impl Into<String>,
        start_at: impl Into<StateName>,
        states: Vec<State>,
    ) -> SpecResult<Self> {
        let name = name.into();
        let machine = Self {
            comment: format!("{name} batch pipeline"),
            name,
            start_at: start_at.into(),
            states,
        };
        machine.validate()?;
        Ok(machine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_at(&self) -> &str {
        &self.start_at
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name() == name)
    }

    /// Comprueba nombres únicos, inicio existente y que no haya transiciones
    /// colgando.
    pub fn validate(&self) -> SpecResult<()> {
        let mut names: HashSet<&str> = HashSet::with_capacity(self.states.len());
        for state in &self.states {
            if state.name().is_empty() {
                return Err(SpecError::InvalidNode {
                    name: String::new(),
                    reason: "state name cannot be empty".to_string(),
                });
            }
            if !names.insert(state.name()) {
                return Err(SpecError::DuplicateState(state.name().to_string()));
            }
        }

        if !names.contains(self.start_at.as_str()) {
            return Err(SpecError::MissingStart(self.start_at.clone()));
        }

        for state in &self.states {
            for next in state.successors() {
                if !names.contains(next) {
                    return Err(SpecError::DanglingReference {
                        from: state.name().to_string(),
                        to: next.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn build(&self) -> Record {
        let states: Map<String, Value> = self
            .states
            .iter()
            .map(|s| (s.name().to_string(), s.build()))
            .collect();

        json!({
            "Comment": self.comment,
            "StartAt": self.start_at,
            "States": states,
        })
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.build())
    }
}

impl Serialize for StateMachine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.build().serialize(serializer)
    }
}
