//! # API REST
//!
//! REST API for the metadata registry.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, the acting-user header)
//!
//! Every operation is delegated to [`RegistryService`], which enforces permissions. The acting
//! user is named by the `x-mdr-user` header (a username or user ID); requests without it are
//! served as anonymous and only see public content.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::NaiveDate;
use mdr_core::{
    Action, AuthorityId, GroupOwner, ItemId, Registry, RegistrationState, RegistryError,
    RegistryResult, RegistryService, UserId, WorkgroupId,
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use dto::*;
pub use error::ApiError;

/// Header naming the acting user.
pub const USER_HEADER: &str = "x-mdr-user";

/// Application state shared across REST handlers.
#[derive(Clone)]
struct AppState {
    service: RegistryService,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_items,
        get_item,
        register_item,
        item_permissions,
        add_member,
        remove_member,
        give_workgroup_role,
        remove_workgroup_role,
        give_authority_role,
        remove_authority_role,
        standard_items,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        ItemSummary,
        ListItemsRes,
        ItemRes,
        StatusRes,
        RegisterReq,
        DecisionRes,
        PermissionsRes,
        MemberReq,
        RoleReq,
        RolesRes,
        StandardEntry,
        StandardRes,
    ))
)]
struct ApiDoc;

/// Builds the REST router, including Swagger UI at `/swagger-ui`.
pub fn router(service: RegistryService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/items", get(list_items))
        .route("/items/:id", get(get_item))
        .route("/items/:id/register", post(register_item))
        .route("/items/:id/permissions", get(item_permissions))
        .route("/workgroups/:id/members", post(add_member))
        .route("/workgroups/:id/members/:user", delete(remove_member))
        .route(
            "/workgroups/:id/roles",
            post(give_workgroup_role).delete(remove_workgroup_role),
        )
        .route(
            "/authorities/:id/roles",
            post(give_authority_role).delete(remove_authority_role),
        )
        .route("/authorities/:id/standard", get(standard_items))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

// ============================================================================
// Request helpers
// ============================================================================

fn find_user(reg: &Registry, name: &str) -> RegistryResult<UserId> {
    if let Ok(id) = name.parse::<UserId>() {
        return Ok(reg.user(id)?.id);
    }
    reg.user_by_name(name)
        .map(|u| u.id)
        .ok_or_else(|| RegistryError::InvalidInput(format!("unknown user \"{name}\"")))
}

/// The user named by the `x-mdr-user` header, if any.
fn acting_user(state: &AppState, headers: &HeaderMap) -> Result<Option<UserId>, ApiError> {
    let Some(value) = headers.get(USER_HEADER) else {
        return Ok(None);
    };
    let name = value
        .to_str()
        .map_err(|_| ApiError::bad_request(format!("{USER_HEADER} is not valid text")))?;
    let user = state.service.read(|reg| find_user(reg, name.trim()))?;
    Ok(Some(user))
}

fn require_user(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    acting_user(state, headers)?
        .ok_or_else(|| ApiError::bad_request(format!("missing {USER_HEADER} header")))
}

fn item_res(reg: &Registry, id: ItemId) -> RegistryResult<ItemRes> {
    let item = reg.item(id)?;
    let statuses = reg
        .statuses_for_item(id)
        .into_iter()
        .map(|s| StatusRes::build(reg, s))
        .collect::<RegistryResult<Vec<_>>>()?;
    Ok(ItemRes {
        id: item.id.to_string(),
        item_type: item.item_type().key().to_string(),
        name: item.name.to_string(),
        description: item.description.clone(),
        workgroup: item.workgroup.to_string(),
        version: item.version.clone(),
        superseded_by: item.superseded_by.map(|s| s.to_string()),
        ready_to_review: item.ready_to_review,
        statuses,
    })
}

fn roles_res(service: &RegistryService, owner: GroupOwner, user: UserId) -> RegistryResult<RolesRes> {
    service.read(|reg| {
        Ok(RolesRes {
            owner: reg.owner_name(owner)?.to_string(),
            user: reg.user(user)?.username.to_string(),
            roles: reg
                .roles_of(owner, user)
                .into_iter()
                .map(|r| r.label().to_string())
                .collect(),
        })
    })
}

// ============================================================================
// Handlers
// ============================================================================

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint used by monitoring and load balancers.
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "MDR REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/items",
    responses(
        (status = 200, description = "Items visible to the caller", body = ListItemsRes),
        (status = 400, description = "Unknown acting user", body = ErrorRes)
    )
)]
/// List items.
///
/// Anonymous callers get public items; named users get everything they may view.
#[axum::debug_handler]
async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListItemsRes>, ApiError> {
    let actor = acting_user(&state, &headers)?;
    let items = state.service.visible_items_for(actor)?;
    Ok(Json(ListItemsRes {
        items: items.iter().map(ItemSummary::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/items/{id}",
    params(("id" = String, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item with its statuses", body = ItemRes),
        (status = 400, description = "Invalid ID or acting user", body = ErrorRes),
        (status = 403, description = "Caller may not view the item", body = ErrorRes),
        (status = 404, description = "No such item", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ItemRes>, ApiError> {
    let id = ItemId::parse(&id).map_err(RegistryError::from)?;
    let actor = acting_user(&state, &headers)?;
    let res = state.service.read_item(actor, id, |reg| item_res(reg, id))?;
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/items/{id}/register",
    params(("id" = String, Path, description = "Item ID")),
    request_body = RegisterReq,
    responses(
        (status = 200, description = "Status recorded", body = StatusRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 403, description = "Caller may not change the status", body = ErrorRes),
        (status = 404, description = "No such item or authority", body = ErrorRes)
    )
)]
/// Register an item, or change its state, in a registration authority.
///
/// With `cascade` set, dependents the caller may register are moved to the same state.
#[axum::debug_handler]
async fn register_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RegisterReq>,
) -> Result<Json<StatusRes>, ApiError> {
    let actor = require_user(&state, &headers)?;
    let id = ItemId::parse(&id).map_err(RegistryError::from)?;
    let authority = AuthorityId::parse(&req.authority).map_err(RegistryError::from)?;
    let registration_state = req
        .state
        .parse::<RegistrationState>()
        .map_err(RegistryError::from)?;
    let registration_date = req
        .registration_date
        .as_deref()
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .map_err(|e| ApiError::bad_request(format!("invalid registration_date: {e}")))?;

    let status = state.service.register(
        actor,
        authority,
        id,
        registration_state,
        registration_date,
        req.cascade,
        req.change_details,
    )?;
    let res = state.service.read(|reg| StatusRes::build(reg, &status))?;
    Ok(Json(res))
}

#[utoipa::path(
    get,
    path = "/items/{id}/permissions",
    params(
        ("id" = String, Path, description = "Item ID"),
        ("authority" = Option<String>, Query, description = "Authority for status changes")
    ),
    responses(
        (status = 200, description = "What the caller may do with the item", body = PermissionsRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "No such item", body = ErrorRes)
    )
)]
/// Evaluate every action for the acting user against an item.
#[axum::debug_handler]
async fn item_permissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<PermissionsQuery>,
) -> Result<Json<PermissionsRes>, ApiError> {
    let actor = require_user(&state, &headers)?;
    let id = ItemId::parse(&id).map_err(RegistryError::from)?;
    let authority = query
        .authority
        .as_deref()
        .map(AuthorityId::parse)
        .transpose()
        .map_err(RegistryError::from)?;

    let decisions = Action::ALL
        .into_iter()
        .map(|action| {
            state
                .service
                .decide(actor, action, id, authority)
                .map(DecisionRes::from)
        })
        .collect::<RegistryResult<Vec<_>>>()?;
    let user = state
        .service
        .read(|reg| Ok(reg.user(actor)?.username.to_string()))?;
    Ok(Json(PermissionsRes {
        item: id.to_string(),
        user,
        decisions,
    }))
}

#[utoipa::path(
    post,
    path = "/workgroups/{id}/members",
    params(("id" = String, Path, description = "Workgroup ID")),
    request_body = MemberReq,
    responses(
        (status = 200, description = "Member added with the Viewer role", body = RolesRes),
        (status = 403, description = "Caller does not manage the workgroup", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn add_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<MemberReq>,
) -> Result<Json<RolesRes>, ApiError> {
    let actor = require_user(&state, &headers)?;
    let workgroup = WorkgroupId::parse(&id).map_err(RegistryError::from)?;
    let user = state.service.read(|reg| find_user(reg, &req.user))?;
    state.service.add_user_to_workgroup(actor, workgroup, user)?;
    Ok(Json(roles_res(&state.service, workgroup.into(), user)?))
}

#[utoipa::path(
    delete,
    path = "/workgroups/{id}/members/{user}",
    params(
        ("id" = String, Path, description = "Workgroup ID"),
        ("user" = String, Path, description = "Username or user ID")
    ),
    responses(
        (status = 204, description = "Member removed and every workgroup role revoked"),
        (status = 403, description = "Caller does not manage the workgroup", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, user)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let actor = require_user(&state, &headers)?;
    let workgroup = WorkgroupId::parse(&id).map_err(RegistryError::from)?;
    let user = state.service.read(|reg| find_user(reg, &user))?;
    state
        .service
        .remove_user_from_workgroup(actor, workgroup, user)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_role(
    state: &AppState,
    headers: &HeaderMap,
    owner: GroupOwner,
    req: &RoleReq,
    grant: bool,
) -> Result<Json<RolesRes>, ApiError> {
    let actor = require_user(state, headers)?;
    let user = state.service.read(|reg| find_user(reg, &req.user))?;
    if grant {
        state.service.give_role(actor, owner, &req.role, user)?;
    } else {
        state.service.remove_role(actor, owner, &req.role, user)?;
    }
    Ok(Json(roles_res(&state.service, owner, user)?))
}

#[utoipa::path(
    post,
    path = "/workgroups/{id}/roles",
    params(("id" = String, Path, description = "Workgroup ID")),
    request_body = RoleReq,
    responses(
        (status = 200, description = "Roles held after the grant", body = RolesRes),
        (status = 403, description = "Caller does not manage the workgroup", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn give_workgroup_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RoleReq>,
) -> Result<Json<RolesRes>, ApiError> {
    let workgroup = WorkgroupId::parse(&id).map_err(RegistryError::from)?;
    change_role(&state, &headers, workgroup.into(), &req, true).await
}

#[utoipa::path(
    delete,
    path = "/workgroups/{id}/roles",
    params(("id" = String, Path, description = "Workgroup ID")),
    request_body = RoleReq,
    responses(
        (status = 200, description = "Roles held after the revocation", body = RolesRes),
        (status = 403, description = "Caller does not manage the workgroup", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn remove_workgroup_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RoleReq>,
) -> Result<Json<RolesRes>, ApiError> {
    let workgroup = WorkgroupId::parse(&id).map_err(RegistryError::from)?;
    change_role(&state, &headers, workgroup.into(), &req, false).await
}

#[utoipa::path(
    post,
    path = "/authorities/{id}/roles",
    params(("id" = String, Path, description = "Registration authority ID")),
    request_body = RoleReq,
    responses(
        (status = 200, description = "Roles held after the grant", body = RolesRes),
        (status = 403, description = "Caller is not a superuser", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn give_authority_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RoleReq>,
) -> Result<Json<RolesRes>, ApiError> {
    let authority = AuthorityId::parse(&id).map_err(RegistryError::from)?;
    change_role(&state, &headers, authority.into(), &req, true).await
}

#[utoipa::path(
    delete,
    path = "/authorities/{id}/roles",
    params(("id" = String, Path, description = "Registration authority ID")),
    request_body = RoleReq,
    responses(
        (status = 200, description = "Roles held after the revocation", body = RolesRes),
        (status = 403, description = "Caller is not a superuser", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn remove_authority_role(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RoleReq>,
) -> Result<Json<RolesRes>, ApiError> {
    let authority = AuthorityId::parse(&id).map_err(RegistryError::from)?;
    change_role(&state, &headers, authority.into(), &req, false).await
}

#[utoipa::path(
    get,
    path = "/authorities/{id}/standard",
    params(("id" = String, Path, description = "Registration authority ID")),
    responses(
        (status = 200, description = "Standard data set specifications and packages", body = StandardRes),
        (status = 404, description = "No such authority", body = ErrorRes)
    )
)]
/// Standard data set specifications and packages of an authority, newest first.
#[axum::debug_handler]
async fn standard_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StandardRes>, ApiError> {
    let authority = AuthorityId::parse(&id).map_err(RegistryError::from)?;
    let data_set_specifications = state
        .service
        .standard_data_set_specifications(authority)?
        .iter()
        .map(StandardEntry::from)
        .collect();
    let packages = state
        .service
        .standard_packages(authority)?
        .iter()
        .map(StandardEntry::from)
        .collect();
    Ok(Json(StandardRes {
        data_set_specifications,
        packages,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mdr_core::{CoreConfig, ItemType, MemorySink, MemoryStore};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Seed {
        service: RegistryService,
        ra: AuthorityId,
        wg: WorkgroupId,
        person: ItemId,
    }

    fn seed() -> Seed {
        let service = RegistryService::open(
            Arc::new(CoreConfig::default()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemorySink::new()),
        )
        .expect("open service");
        let admin = service.add_user(None, "admin", true).expect("admin");
        let eddie = service.add_user(Some(admin), "eddie", false).expect("eddie");
        let reggie = service.add_user(Some(admin), "reggie", false).expect("reggie");
        service.add_user(Some(admin), "olive", false).expect("olive");

        let ra = service
            .add_authority(admin, "Standards Council", None, None)
            .expect("authority");
        let wg = service.add_workgroup(admin, "Cancer Outcomes").expect("workgroup");
        service.link_workgroup_authority(admin, wg, ra).expect("link");
        service.add_user_to_workgroup(admin, wg, eddie).expect("join");
        service.give_role(admin, wg.into(), "editor", eddie).expect("editor");
        service.give_role(admin, ra.into(), "registrar", reggie).expect("registrar");

        let person = service
            .create_item(eddie, wg, ItemType::ObjectClass, "Person", "A human being")
            .expect("item");
        Seed {
            service,
            ra,
            wg,
            person,
        }
    }

    async fn send(
        seed: &Seed,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            req = req.header(USER_HEADER, user);
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .expect("request");

        let res = router(seed.service.clone())
            .oneshot(req)
            .await
            .expect("response");
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    fn register_body(seed: &Seed, state: &str) -> Value {
        json!({
            "authority": seed.ra.to_string(),
            "state": state,
            "registration_date": "2024-06-01",
        })
    }

    #[tokio::test]
    async fn test_health() {
        let seed = seed();
        let (status, body) = send(&seed, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_list_items_depends_on_caller() {
        let seed = seed();
        let (_, anonymous) = send(&seed, "GET", "/items", None, None).await;
        assert_eq!(anonymous["items"].as_array().expect("items").len(), 0);

        let (_, editor) = send(&seed, "GET", "/items", Some("eddie"), None).await;
        assert_eq!(editor["items"][0]["name"], "Person");
        assert_eq!(editor["items"][0]["item_type"], "object_class");

        let (status, body) = send(&seed, "GET", "/items", Some("nobody"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("message").contains("unknown user"));
    }

    #[tokio::test]
    async fn test_get_item_error_mapping() {
        let seed = seed();
        let uri = format!("/items/{}", seed.person);

        let (status, _) = send(&seed, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&seed, "GET", &uri, Some("olive"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&seed, "GET", &uri, Some("eddie"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["description"], "A human being");

        let missing = format!("/items/{}", ItemId::new());
        let (status, _) = send(&seed, "GET", &missing, Some("eddie"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&seed, "GET", "/items/not-an-id", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_makes_item_public() {
        let seed = seed();
        let uri = format!("/items/{}/register", seed.person);

        let (status, _) =
            send(&seed, "POST", &uri, Some("eddie"), Some(register_body(&seed, "standard"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            send(&seed, "POST", &uri, Some("reggie"), Some(register_body(&seed, "standard"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "standard");
        assert_eq!(body["authority_name"], "Standards Council");
        assert_eq!(body["registration_date"], "2024-06-01");

        let (status, item) = send(&seed, "GET", &format!("/items/{}", seed.person), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["statuses"].as_array().expect("statuses").len(), 1);

        let (status, _) =
            send(&seed, "POST", &uri, Some("reggie"), Some(register_body(&seed, "retired"))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, item) = send(&seed, "GET", &format!("/items/{}", seed.person), Some("eddie"), None).await;
        assert_eq!(item["statuses"].as_array().expect("statuses").len(), 1);
        assert_eq!(item["statuses"][0]["state"], "retired");

        let (status, _) =
            send(&seed, "POST", &uri, Some("reggie"), Some(register_body(&seed, "approved"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_anonymous_caller_sees_public_items_only() {
        let seed = seed();
        let item_uri = format!("/items/{}", seed.person);

        let (status, body) = send(&seed, "GET", &item_uri, None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().expect("message").contains("anonymous"));

        let uri = format!("/items/{}/register", seed.person);
        let (status, _) =
            send(&seed, "POST", &uri, Some("reggie"), Some(register_body(&seed, "recorded"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, item) = send(&seed, "GET", &item_uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["name"], "Person");
        let (_, list) = send(&seed, "GET", "/items", None, None).await;
        assert_eq!(list["items"].as_array().expect("items").len(), 1);

        let missing = format!("/items/{}", ItemId::new());
        let (status, _) = send(&seed, "GET", &missing, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_permissions_report() {
        let seed = seed();
        let uri = format!("/items/{}/permissions", seed.person);
        let (status, body) = send(&seed, "GET", &uri, Some("eddie"), None).await;
        assert_eq!(status, StatusCode::OK);
        let allowed = |body: &Value, action: &str| {
            body["decisions"]
                .as_array()
                .expect("decisions")
                .iter()
                .find(|d| d["action"] == action)
                .map(|d| d["allowed"] == true)
                .expect("action present")
        };
        assert!(allowed(&body, "view"));
        assert!(allowed(&body, "edit"));
        assert!(!allowed(&body, "change_status"));

        let uri = format!("/items/{}/permissions?authority={}", seed.person, seed.ra);
        let (_, body) = send(&seed, "GET", &uri, Some("reggie"), None).await;
        assert!(allowed(&body, "change_status"));
        assert!(!allowed(&body, "edit"));

        let (status, _) = send(&seed, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_membership_and_roles() {
        let seed = seed();
        let members = format!("/workgroups/{}/members", seed.wg);
        let roles = format!("/workgroups/{}/roles", seed.wg);

        let (status, _) =
            send(&seed, "POST", &members, Some("eddie"), Some(json!({"user": "olive"}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &seed,
            "POST",
            &roles,
            Some("admin"),
            Some(json!({"role": "manager", "user": "eddie"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send(&seed, "POST", &members, Some("eddie"), Some(json!({"user": "olive"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roles"], json!(["Viewer"]));

        let (status, _) =
            send(&seed, "DELETE", &format!("{members}/olive"), Some("eddie"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = send(
            &seed,
            "DELETE",
            &roles,
            Some("admin"),
            Some(json!({"role": "viewer", "user": "olive"})),
        )
        .await;
        assert_eq!(body["roles"], json!([]));

        let authority_roles = format!("/authorities/{}/roles", seed.ra);
        let (status, _) = send(
            &seed,
            "DELETE",
            &authority_roles,
            Some("eddie"),
            Some(json!({"role": "registrar", "user": "reggie"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(
            &seed,
            "DELETE",
            &authority_roles,
            Some("admin"),
            Some(json!({"role": "registrar", "user": "reggie"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["owner"], "Standards Council");
        assert_eq!(body["roles"], json!([]));
    }

    #[tokio::test]
    async fn test_standard_listing() {
        let seed = seed();
        let eddie = seed
            .service
            .read(|reg| Ok(reg.user_by_name("eddie").expect("eddie").id))
            .expect("lookup");
        let dss = seed
            .service
            .create_item(eddie, seed.wg, ItemType::DataSetSpecification, "Cancer Registry", "")
            .expect("dss");
        let uri = format!("/items/{dss}/register");
        let (status, _) =
            send(&seed, "POST", &uri, Some("reggie"), Some(register_body(&seed, "standard"))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send(&seed, "GET", &format!("/authorities/{}/standard", seed.ra), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data_set_specifications"][0]["name"], "Cancer Registry");
        assert_eq!(body["packages"], json!([]));
    }

    #[test]
    fn test_error_status_mapping() {
        let conflict = ApiError::from(RegistryError::Conflict {
            item: "Person".into(),
            authority: "Standards Council".into(),
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        let poisoned = ApiError::from(RegistryError::LockPoisoned);
        assert_eq!(poisoned.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
