use salvo::writing::Json;
use salvo::{Response, Router, handler};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// ## Summary
/// GET /api/healthcheck - liveness probe.
#[handler]
async fn healthcheck_handler(res: &mut Response) {
    res.render(Json(HealthResponse { status: "ok" }));
}

pub fn routes() -> Router {
    Router::with_path("healthcheck").get(healthcheck_handler)
}
