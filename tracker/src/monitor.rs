use std::time::Duration;

use tracing::{debug, info};

use crate::state::AppState;

/// Avanza las unidades un paso por tick, para siempre.
pub async fn advance_units(state: AppState, tick: Duration) {
    loop {
        tokio::time::sleep(tick).await;

        let changes = state.advance_all();
        if changes.is_empty() {
            debug!("tick sin cambios");
            continue;
        }

        for (id, from, to) in &changes {
            debug!("unidad {}: {} -> {}", id, from, to);
        }
        info!("tick: {} unidades avanzaron", changes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Stage, SubmitRequest, UnitStatus};

    #[tokio::test]
    async fn el_monitor_lleva_las_unidades_a_succeeded() {
        let state = AppState::default();
        let ids = state
            .submit(SubmitRequest {
                stage: Stage::Genotyping,
                job_definition: "gt:1".to_string(),
                units: 2,
                depends_on: vec![],
            })
            .unwrap();

        let handle = tokio::spawn(advance_units(state.clone(), Duration::from_millis(10)));
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();

        for id in &ids {
            assert_eq!(state.unit(id).unwrap().status, UnitStatus::Succeeded);
        }
    }
}
