//! Generador del sub-grafo "trabajo asíncrono + poller".
//!
//! ```text
//! Submit -> Poll -> Choice { FAIL -> Failed
//!                            SUCCESS -> <siguiente etapa>
//!                            IN_PROGRESS -> Wait }
//! Wait -> Poll
//! ```
//!
//! Los nombres de Wait y Choice se reservan antes de construir nada, así el
//! Task de polling se construye ya apuntando al Choice.

use crate::choice::{Predicate, Rule};
use crate::error::{SpecError, SpecResult};
use crate::states::{Choice, Fail, State, Task, TaskBuilder, Wait};
use crate::status::Outcome;
use crate::StateName;

#[derive(Debug, Clone)]
pub struct AsyncPoller {
    async_task: Task,
    poll_task: TaskBuilder,
    fail: Fail,
    success_next: StateName,
    status_path: String,
    wait_seconds: u64,
    wait_name: StateName,
    choice_name: StateName,
}

impl AsyncPoller {
    /// `async_task` tiene que estar ya cableado a `poll_task` (su `Next` es el
    /// nombre del poller). El sucesor de `poll_task` lo fija el generador.
    pub fn new(
        async_task: Task,
        poll_task: TaskBuilder,
        fail: Fail,
        success_next: impl Into<StateName>,
        status_path: impl Into<String>,
        wait_seconds: u64,
    ) -> Self {
        let wait_name = format!("{}Wait", poll_task.name());
        let choice_name = format!("{}Choice", poll_task.name());
        Self {
            async_task,
            poll_task,
            fail,
            success_next: success_next.into(),
            status_path: status_path.into(),
            wait_seconds,
            wait_name,
            choice_name,
        }
    }

    /// Reemplaza los nombres reservados para los estados Wait y Choice.
    pub fn with_names(mut self, wait: impl Into<StateName>, choice: impl Into<StateName>) -> Self {
        self.wait_name = wait.into();
        self.choice_name = choice.into();
        self
    }

    pub fn entry(&self) -> &str {
        self.async_task.name()
    }

    pub fn choice_name(&self) -> &str {
        &self.choice_name
    }

    /// Devuelve siempre cinco estados: submit, poll, fail, wait y choice.
    pub fn states(self) -> SpecResult<Vec<State>> {
        if self.async_task.next() != Some(self.poll_task.name()) {
            return Err(SpecError::InvalidNode {
                name: self.async_task.name().to_string(),
                reason: format!(
                    "async task must hand over to its poller '{}'",
                    self.poll_task.name()
                ),
            });
        }

        let poll_name = self.poll_task.name().to_string();
        let poll_task = self.poll_task.next(self.choice_name.clone()).build()?;

        let waiter = Wait::new(self.wait_name.clone(), self.wait_seconds, poll_name);

        let rules = Outcome::ALL
            .iter()
            .map(|outcome| {
                let target = match outcome {
                    Outcome::Fail => self.fail.name().to_string(),
                    Outcome::Success => self.success_next.clone(),
                    Outcome::InProgress => self.wait_name.clone(),
                };
                Rule::new(
                    Predicate::string_equals(self.status_path.clone(), outcome.token()),
                    target,
                )
            })
            .collect();

        // Cualquier token desconocido cae en el estado de fallo.
        let choice = Choice::new(self.choice_name, self.fail.name(), rules)?;

        Ok(vec![
            self.async_task.into(),
            poll_task.into(),
            self.fail.into(),
            waiter.into(),
            choice.into(),
        ])
    }
}
