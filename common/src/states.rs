//! Estados de la máquina: Task, Wait, Choice, Succeed y Fail.
//!
//! Cada estado sabe construir su `Record`, el objeto JSON que consume el
//! ejecutor externo. Los estados son valores inmutables: se construyen una vez
//! (validando su contrato) y después solo se leen.

use serde_json::{json, Map, Value};

use crate::choice::Rule;
use crate::error::{SpecError, SpecResult};
use crate::StateName;

/// Registro serializable de un nodo del grafo.
pub type Record = Value;

/// Transición de salida de un Task: o sigue a otro estado o termina la máquina.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Next(StateName),
    End,
}

/// Unidad de trabajo (enviar trabajo o consultar su estado).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    name: StateName,
    resource: String,
    transition: Transition,
    input_path: Option<String>,
    output_path: Option<String>,
    result_path: Option<String>,
}

impl Task {
    pub fn builder(name: impl Into<StateName>, resource: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            name: name.into(),
            resource: resource.into(),
            next: None,
            end: false,
            input_path: None,
            output_path: None,
            result_path: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }

    pub fn next(&self) -> Option<&str> {
        match &self.transition {
            Transition::Next(n) => Some(n),
            Transition::End => None,
        }
    }

    pub fn input_path(&self) -> Option<&str> {
        self.input_path.as_deref()
    }

    pub fn output_path(&self) -> Option<&str> {
        self.output_path.as_deref()
    }

    pub fn result_path(&self) -> Option<&str> {
        self.result_path.as_deref()
    }

    pub fn build(&self) -> Record {
        let mut out = Map::new();
        out.insert("Type".to_string(), json!("Task"));
        out.insert("Resource".to_string(), json!(self.resource));
        if let Some(p) = &self.input_path {
            out.insert("InputPath".to_string(), json!(p));
        }
        if let Some(p) = &self.output_path {
            out.insert("OutputPath".to_string(), json!(p));
        }
        if let Some(p) = &self.result_path {
            out.insert("ResultPath".to_string(), json!(p));
        }
        match &self.transition {
            Transition::Next(next) => out.insert("Next".to_string(), json!(next)),
            Transition::End => out.insert("End".to_string(), json!(true)),
        };
        Value::Object(out)
    }
}

/// Builder de `Task`. Permite fijar el sucesor más tarde, una vez que el
/// nombre del estado siguiente ya está reservado.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    name: StateName,
    resource: String,
    next: Option<StateName>,
    end: bool,
    input_path: Option<String>,
    output_path: Option<String>,
    result_path: Option<String>,
}

impl TaskBuilder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next(mut self, next: impl Into<StateName>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn end(mut self) -> Self {
        self.end = true;
        self
    }

    pub fn input_path(mut self, path: impl Into<String>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn result_path(mut self, path: impl Into<String>) -> Self {
        self.result_path = Some(path.into());
        self
    }

    /// Falla con `InvalidNode` si no hay exactamente uno de `next` / `end`.
    pub fn build(self) -> SpecResult<Task> {
        let invalid = |reason: &str| SpecError::InvalidNode {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.resource.is_empty() {
            return Err(invalid("task needs a resource"));
        }

        let transition = match (self.next.clone(), self.end) {
            (Some(next), false) => Transition::Next(next),
            (None, true) => Transition::End,
            (None, false) => return Err(invalid("must set either next or end")),
            (Some(_), true) => return Err(invalid("cannot set both next and end")),
        };

        Ok(Task {
            name: self.name,
            resource: self.resource,
            transition,
            input_path: self.input_path,
            output_path: self.output_path,
            result_path: self.result_path,
        })
    }
}

/// Espera incondicional antes de seguir a `next`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wait {
    name: StateName,
    seconds: u64,
    next: StateName,
}

impl Wait {
    pub fn new(name: impl Into<StateName>, seconds: u64, next: impl Into<StateName>) -> Self {
        Self {
            name: name.into(),
            seconds,
            next: next.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn next(&self) -> &str {
        &self.next
    }

    pub fn build(&self) -> Record {
        json!({
            "Type": "Wait",
            "Seconds": self.seconds,
            "Next": self.next,
        })
    }
}

/// Evalúa las reglas en orden; si ninguna aplica salta a `default`.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    name: StateName,
    default: StateName,
    rules: Vec<Rule>,
}

impl Choice {
    pub fn new(
        name: impl Into<StateName>,
        default: impl Into<StateName>,
        rules: Vec<Rule>,
    ) -> SpecResult<Self> {
        let name = name.into();
        if rules.is_empty() {
            return Err(SpecError::InvalidNode {
                name,
                reason: "choice needs at least one rule".to_string(),
            });
        }
        Ok(Self {
            name,
            default: default.into(),
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> &str {
        &self.default
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn build(&self) -> Record {
        json!({
            "Type": "Choice",
            "Choices": self.rules.iter().map(Rule::build).collect::<Vec<_>>(),
            "Default": self.default,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Succeed {
    name: StateName,
}

impl Succeed {
    pub fn new(name: impl Into<StateName>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self) -> Record {
        json!({ "Type": "Succeed" })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fail {
    name: StateName,
    cause: Option<String>,
    error: Option<String>,
}

impl Fail {
    pub fn new(name: impl Into<StateName>) -> Self {
        Self {
            name: name.into(),
            cause: None,
            error: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn build(&self) -> Record {
        let mut out = Map::new();
        out.insert("Type".to_string(), json!("Fail"));
        if let Some(c) = &self.cause {
            out.insert("Cause".to_string(), json!(c));
        }
        if let Some(e) = &self.error {
            out.insert("Error".to_string(), json!(e));
        }
        Value::Object(out)
    }
}

/// Cualquier nodo de la máquina.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Task(Task),
    Wait(Wait),
    Choice(Choice),
    Succeed(Succeed),
    Fail(Fail),
}

impl State {
    pub fn name(&self) -> &str {
        match self {
            State::Task(s) => s.name(),
            State::Wait(s) => s.name(),
            State::Choice(s) => s.name(),
            State::Succeed(s) => s.name(),
            State::Fail(s) => s.name(),
        }
    }

    pub fn build(&self) -> Record {
        match self {
            State::Task(s) => s.build(),
            State::Wait(s) => s.build(),
            State::Choice(s) => s.build(),
            State::Succeed(s) => s.build(),
            State::Fail(s) => s.build(),
        }
    }

    /// Nombres de todos los estados a los que este puede transferir el control.
    pub fn successors(&self) -> Vec<&str> {
        match self {
            State::Task(t) => t.next().into_iter().collect(),
            State::Wait(w) => vec![w.next()],
            State::Choice(c) => c
                .rules()
                .iter()
                .map(Rule::next)
                .chain(std::iter::once(c.default()))
                .collect(),
            State::Succeed(_) | State::Fail(_) => Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            State::Succeed(_) | State::Fail(_) => true,
            State::Task(t) => matches!(t.transition(), Transition::End),
            State::Wait(_) | State::Choice(_) => false,
        }
    }
}

impl From<Task> for State {
    fn from(s: Task) -> Self {
        State::Task(s)
    }
}

impl From<Wait> for State {
    fn from(s: Wait) -> Self {
        State::Wait(s)
    }
}

impl From<Choice> for State {
    fn from(s: Choice) -> Self {
        State::Choice(s)
    }
}

impl From<Succeed> for State {
    fn from(s: Succeed) -> Self {
        State::Succeed(s)
    }
}

impl From<Fail> for State {
    fn from(s: Fail) -> Self {
        State::Fail(s)
    }
}
