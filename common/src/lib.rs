//! Autoría de máquinas de estado para pipelines batch y agregación de
//! estados de unidades de trabajo.

pub mod api;
pub mod choice;
pub mod error;
pub mod machine;
pub mod pipeline;
pub mod poll;
pub mod states;
pub mod status;

pub type StateName = String;
pub type UnitId = String;

pub use api::{
    ApiError, DescribeRequest, DescribeResponse, StatusOverrideRequest, SubmitRequest,
    SubmitResponse, UnitInfo, UnitReport,
};
pub use choice::{Condition, Operator, Predicate, Rule, ValueCategory};
pub use error::{SpecError, SpecResult};
pub use machine::StateMachine;
pub use pipeline::{
    plan, EntryPoint, PipelineAssembler, PipelineFlags, PipelineInput, ResourceCatalog, Stage,
    StageResources, SUCCEEDED_STATE,
};
pub use poll::AsyncPoller;
pub use states::{Choice, Fail, Record, State, Succeed, Task, TaskBuilder, Transition, Wait};
pub use status::{polling_outcome, Outcome, UnitStatus};
