//! Consulta del estado de unidades batch y espera de etapas.

pub mod config;
pub mod http;
pub mod poller;
pub mod source;

pub use config::{tracker_base_url, PollConfig};
pub use http::HttpTracker;
pub use poller::{split_list, unit_ids_from_event, BatchStatusPoller, PollError, StageReport};
pub use source::{QueryError, StatusSource, WorkSubmitter};
