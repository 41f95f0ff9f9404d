//! OpenAPI documentation for the `/api/v1` surface.
//!
//! The document is served at `/api/v1/openapi.json` and rendered by Scalar at `/api/v1/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Registers the two ways a request can authenticate.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.security_schemes.insert(
            "ApiKey".to_string(),
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "x-api-key",
                "The user's id. May also be sent as the `apiKey` query parameter.",
            ))),
        );
        components.security_schemes.insert(
            "BearerAuth".to_string(),
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Session token issued by `POST /auth/login`."))
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Zoe API", description = "Users, groups, login auditing and notifications"),
    servers((url = "/api/v1", description = "Zoe API server")),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::system::health,
        api::handlers::auth::login,
        api::handlers::auth::session,
        api::handlers::auth::logout,
        api::handlers::users::list_users,
        api::handlers::users::create_user,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::change_password,
        api::handlers::users::delete_user,
        api::handlers::users::list_devices,
        api::handlers::users::remove_device,
        api::handlers::users::list_logins,
        api::handlers::groups::list_groups,
        api::handlers::groups::create_group,
        api::handlers::groups::get_group,
        api::handlers::groups::update_group,
        api::handlers::groups::delete_group,
        api::handlers::groups::add_member,
        api::handlers::groups::remove_member,
        api::handlers::notifications::list_notifications,
        api::handlers::notifications::send_notification,
        api::handlers::notifications::mark_read,
        api::handlers::notifications::delete_notification,
    ),
    components(
        schemas(
            api::models::MessageResponse,
            api::models::pagination::PaginationInfo,
            api::models::system::HealthResponse,
            api::models::auth::LoginRequest,
            api::models::auth::LoginResponse,
            api::models::auth::SessionResponse,
            api::models::auth::LogoutRequest,
            api::models::users::UserResponse,
            api::models::users::UserCreate,
            api::models::users::UserUpdate,
            api::models::users::PasswordChange,
            api::models::users::DevicesResponse,
            api::models::login_logs::LoginLogResponse,
            api::models::groups::GroupCreate,
            api::models::groups::GroupUpdate,
            api::models::groups::AddMemberRequest,
            api::models::groups::GroupResponse,
            api::models::groups::GroupDetailResponse,
            api::models::notifications::NotificationCreate,
            api::models::notifications::NotificationResponse,
            api::models::notifications::NotificationListResponse,
        )
    ),
    tags(
        (name = "system", description = "Service health"),
        (name = "auth", description = "Login with device registration, session lookup and logout"),
        (name = "users", description = "User accounts, password changes, devices and login history"),
        (name = "groups", description = "Groups and their memberships"),
        (name = "notifications", description = "The caller's notification inbox"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes_and_security() {
        let doc = ApiDoc::openapi();

        for path in ["/auth/login", "/users/{user_id}", "/groups/{group_id}/members", "/notifications"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("ApiKey"));
        assert!(schemes.contains_key("BearerAuth"));
    }
}
