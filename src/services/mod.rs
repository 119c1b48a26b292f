/// OpenAPI documentation generation.
pub mod documentation;
/// Turn handling for player actions and store deliveries.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Shared store connection supervisor with backoff.
pub mod storage_supervisor;
/// Remote sync adapter over the shared document store.
pub mod sync_service;
