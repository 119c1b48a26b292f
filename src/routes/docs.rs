use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Where the generated OpenAPI document is served.
const OPENAPI_JSON_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI for the view and action endpoints, mounted at `/docs`.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::<SharedState>::from(SwaggerUi::new("/docs").url(OPENAPI_JSON_PATH, ApiDoc::openapi()))
        .with_state(state)
}
