use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Station Quest Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::view_stream,
        crate::routes::game::get_view,
        crate::routes::game::post_action,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::StatusEvent,
            crate::dto::action::ActionRequest,
            crate::dto::view::DeviceView,
            crate::state::actions::Action,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "game", description = "Device view and player actions"),
    )
)]
pub struct ApiDoc;
