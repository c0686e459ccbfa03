use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{
    ApiError, DescribeRequest, DescribeResponse, StatusOverrideRequest, SubmitRequest,
    SubmitResponse, UnitInfo,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::{AppState, TrackerError};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(submit_units))
        .route("/api/v1/jobs/describe", post(describe_units))
        .route("/api/v1/jobs/:id", get(get_unit))
        .route("/api/v1/jobs/:id/status", post(override_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let code = match self {
            TrackerError::UnknownUnit(_) => StatusCode::NOT_FOUND,
            TrackerError::NoUnits
            | TrackerError::TooManyIds { .. }
            | TrackerError::UnknownDependency(_) => StatusCode::BAD_REQUEST,
        };
        warn!("request rechazado: {}", self);
        (
            code,
            Json(ApiError {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Encola N unidades de una etapa
async fn submit_units(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, TrackerError> {
    let stage = req.stage;
    let units = req.units;
    let job_ids = state.submit(req)?;
    info!("etapa {}: {} unidades encoladas", stage, units);
    Ok(Json(SubmitResponse { job_ids }))
}

// Estado de un lote de unidades
async fn describe_units(
    State(state): State<AppState>,
    Json(req): Json<DescribeRequest>,
) -> Result<Json<DescribeResponse>, TrackerError> {
    let jobs = state.describe(&req.jobs)?;
    Ok(Json(DescribeResponse { jobs }))
}

// Registro completo de una unidad
async fn get_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UnitInfo>, TrackerError> {
    state
        .unit(&id)
        .map(Json)
        .ok_or(TrackerError::UnknownUnit(id))
}

// Override manual de operador (p.ej. para inyectar fallos)
async fn override_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StatusOverrideRequest>,
) -> Result<Json<UnitInfo>, TrackerError> {
    let unit = state.pin_status(&id, req.status)?;
    info!("unidad {} fijada en {}", id, unit.status);
    Ok(Json(unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use common::{Stage, UnitReport, UnitStatus};
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn submit(state: &AppState, units: u32) -> Vec<String> {
        let (code, body) = call(
            build_router(state.clone()),
            "POST",
            "/api/v1/jobs",
            Some(json!({"stage": "alignment", "job_definition": "align:1", "units": units})),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        parse::<SubmitResponse>(&body).job_ids
    }

    #[tokio::test]
    async fn health_responde_ok() {
        let (code, body) = call(build_router(AppState::default()), "GET", "/health", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn submit_y_describe() {
        let state = AppState::default();
        let ids = submit(&state, 2).await;
        assert_eq!(ids.len(), 2);

        let (code, body) = call(
            build_router(state.clone()),
            "POST",
            "/api/v1/jobs/describe",
            Some(json!({"jobs": [ids[0], "ghost", ids[1]]})),
        )
        .await;
        assert_eq!(code, StatusCode::OK);

        let resp: DescribeResponse = parse(&body);
        assert_eq!(
            resp.jobs,
            vec![
                UnitReport { job_id: ids[0].clone(), status: UnitStatus::Submitted },
                UnitReport { job_id: ids[1].clone(), status: UnitStatus::Submitted },
            ]
        );
    }

    #[tokio::test]
    async fn submit_con_cero_unidades_es_400() {
        let (code, body) = call(
            build_router(AppState::default()),
            "POST",
            "/api/v1/jobs",
            Some(json!({"stage": "genotyping", "job_definition": "gt", "units": 0})),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        let err: ApiError = parse(&body);
        assert!(err.error.contains("at least 1"));
    }

    #[tokio::test]
    async fn describe_con_demasiados_ids_es_400() {
        let ids: Vec<String> = (0..3).map(|i| format!("u{i}")).collect();
        let (code, _) = call(
            build_router(AppState::new(2)),
            "POST",
            "/api/v1/jobs/describe",
            Some(json!({ "jobs": ids })),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_unit_devuelve_registro_o_404() {
        let state = AppState::default();
        let ids = submit(&state, 1).await;

        let (code, body) =
            call(build_router(state.clone()), "GET", &format!("/api/v1/jobs/{}", ids[0]), None).await;
        assert_eq!(code, StatusCode::OK);
        let unit: UnitInfo = parse(&body);
        assert_eq!(unit.stage, Stage::Alignment);
        assert_eq!(unit.job_definition, "align:1");

        let (code, _) = call(build_router(state), "GET", "/api/v1/jobs/ghost", None).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn override_fija_el_estado() {
        let state = AppState::default();
        let ids = submit(&state, 1).await;

        let (code, body) = call(
            build_router(state.clone()),
            "POST",
            &format!("/api/v1/jobs/{}/status", ids[0]),
            Some(json!({"status": "FAILED"})),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        let unit: UnitInfo = parse(&body);
        assert_eq!(unit.status, UnitStatus::Failed);
        assert!(unit.pinned);

        let (code, _) = call(
            build_router(state),
            "POST",
            "/api/v1/jobs/ghost/status",
            Some(json!({"status": "FAILED"})),
        )
        .await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn estado_desconocido_en_override_se_rechaza() {
        let state = AppState::default();
        let ids = submit(&state, 1).await;
        let (code, _) = call(
            build_router(state),
            "POST",
            &format!("/api/v1/jobs/{}/status", ids[0]),
            Some(json!({"status": "ZOMBIE"})),
        )
        .await;
        assert!(code.is_client_error());
    }
}
