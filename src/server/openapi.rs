use super::handlers::{health, login, session, user};
use axum::response::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        user::current_user,
        login::login,
        session::rotate_token,
        session::logout
    ),
    components(schemas(health::Health, user::IdentityView, session::RotateResponse)),
    tags(
        (name = "health", description = "Service health"),
        (name = "authn", description = "Authentication and identity")
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}
