//! OpenAPI documentation for the `/api` surface, served at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;
use crate::callbacks;
use crate::db::models::projects::ModelStatus;

/// Security schemes for caller authentication.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "trainctl_session",
                    "Session JWT issued by the login service",
                ))),
            );
            components.security_schemes.insert(
                "X-Trainctl-User".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-trainctl-user",
                    "User id set by a trusted authenticating proxy (when enabled)",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    servers(
        (url = "/api", description = "Training API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::projects::start_training,
        api::handlers::projects::get_project,
        api::handlers::callbacks::completion_callback,
    ),
    components(
        schemas(
            api::models::projects::ProjectResponse,
            api::models::projects::StartTrainingResponse,
            api::models::projects::CallbackAck,
            callbacks::events::CompletionPayload,
            ModelStatus,
        )
    ),
    tags(
        (name = "projects", description = "Training projects"),
        (name = "callbacks", description = "Callbacks from the training service"),
    ),
    info(
        title = "trainctl",
        description = "Training job orchestration for personalised image models",
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes_and_security() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/projects/{id}/train"));
        assert!(doc.paths.paths.contains_key("/projects/{id}"));
        assert!(doc.paths.paths.contains_key("/webhooks/completed"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("CookieAuth"));
        assert!(components.schemas.contains_key("ProjectResponse"));
    }
}
