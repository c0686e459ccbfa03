//! Reglas de los estados Choice: predicados de comparación y cláusulas
//! booleanas (`Not`, `And`, `Or`).
//!
//! Un predicado es un valor etiquetado `{operador, categoría, variable, valor}`
//! que se valida al construirlo: el valor tiene que ser del tipo que exige la
//! categoría o se devuelve `SpecError::TypeMismatch`.

use chrono::DateTime;
use serde_json::{json, Map, Value};

use crate::error::{SpecError, SpecResult};
use crate::states::Record;
use crate::StateName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Operator {
    fn suffix(self) -> &'static str {
        match self {
            Operator::Equals => "Equals",
            Operator::GreaterThan => "GreaterThan",
            Operator::GreaterThanOrEqual => "GreaterThanEquals",
            Operator::LessThan => "LessThan",
            Operator::LessThanOrEqual => "LessThanEquals",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    String,
    Numeric,
    Timestamp,
}

impl ValueCategory {
    fn prefix(self) -> &'static str {
        match self {
            ValueCategory::String => "String",
            ValueCategory::Numeric => "Numeric",
            ValueCategory::Timestamp => "Timestamp",
        }
    }

    fn expected(self) -> &'static str {
        match self {
            ValueCategory::String => "string",
            ValueCategory::Numeric => "number",
            ValueCategory::Timestamp => "RFC 3339 timestamp",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ValueCategory::String => value.is_string(),
            ValueCategory::Numeric => value.is_number(),
            ValueCategory::Timestamp => value
                .as_str()
                .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
        }
    }
}

/// Comparación de una variable del contexto de ejecución contra un literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    operator: Operator,
    category: ValueCategory,
    variable: String,
    value: Value,
}

impl Predicate {
    pub fn new(
        category: ValueCategory,
        operator: Operator,
        variable: impl Into<String>,
        value: impl Into<Value>,
    ) -> SpecResult<Self> {
        let value = value.into();
        if !category.accepts(&value) {
            return Err(SpecError::TypeMismatch {
                operator: format!("{}{}", category.prefix(), operator.suffix()),
                expected: category.expected(),
                found: value.to_string(),
            });
        }
        Ok(Self {
            operator,
            category,
            variable: variable.into(),
            value,
        })
    }

    /// Atajo para el caso más común: comparar un token de texto.
    pub fn string_equals(variable: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            operator: Operator::Equals,
            category: ValueCategory::String,
            variable: variable.into(),
            value: Value::String(value.into()),
        }
    }

    /// Nombre del operador tal como lo espera el ejecutor, ej. `NumericLessThanEquals`.
    pub fn operator_key(&self) -> String {
        format!("{}{}", self.category.prefix(), self.operator.suffix())
    }

    pub fn build(&self) -> Record {
        let mut out = Map::new();
        out.insert("Variable".to_string(), json!(self.variable));
        out.insert(self.operator_key(), self.value.clone());
        Value::Object(out)
    }
}

/// Predicado o combinación booleana de predicados.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare(Predicate),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn not(clause: impl Into<Condition>) -> Self {
        Condition::Not(Box::new(clause.into()))
    }

    pub fn and(clauses: Vec<Condition>) -> SpecResult<Self> {
        non_empty("And", &clauses)?;
        Ok(Condition::And(clauses))
    }

    pub fn or(clauses: Vec<Condition>) -> SpecResult<Self> {
        non_empty("Or", &clauses)?;
        Ok(Condition::Or(clauses))
    }

    pub fn build(&self) -> Record {
        match self {
            Condition::Compare(p) => p.build(),
            Condition::Not(inner) => json!({ "Not": inner.build() }),
            Condition::And(clauses) => {
                json!({ "And": clauses.iter().map(Condition::build).collect::<Vec<_>>() })
            }
            Condition::Or(clauses) => {
                json!({ "Or": clauses.iter().map(Condition::build).collect::<Vec<_>>() })
            }
        }
    }
}

impl From<Predicate> for Condition {
    fn from(p: Predicate) -> Self {
        Condition::Compare(p)
    }
}

fn non_empty(op: &str, clauses: &[Condition]) -> SpecResult<()> {
    if clauses.is_empty() {
        return Err(SpecError::InvalidNode {
            name: op.to_string(),
            reason: "needs at least one clause".to_string(),
        });
    }
    Ok(())
}

/// Una rama de un Choice: si la condición se cumple, se salta a `next`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    condition: Condition,
    next: StateName,
}

impl Rule {
    pub fn new(condition: impl Into<Condition>, next: impl Into<StateName>) -> Self {
        Self {
            condition: condition.into(),
            next: next.into(),
        }
    }

    pub fn next(&self) -> &str {
        &self.next
    }

    pub fn build(&self) -> Record {
        let mut record = self.condition.build();
        if let Value::Object(ref mut map) = record {
            map.insert("Next".to_string(), json!(self.next));
        }
        record
    }
}
