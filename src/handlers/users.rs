//! User profile endpoints.
//!
//! Profiles are provisioned out of band together with auth tokens, so there is
//! no write surface here. Thin enough that the handlers query the entities
//! directly instead of going through a service.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{authorize, Capability, RequestContext},
    entities::{business, user_profile, user_profile::UserRole},
    errors::ServiceError,
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfileView {
    pub id: Uuid,
    pub display_name: String,
    pub role: UserRole,
    pub business_id: i32,
    pub created_at: DateTime<Utc>,
}

impl From<user_profile::Model> for UserProfileView {
    fn from(model: user_profile::Model) -> Self {
        Self {
            id: model.id,
            display_name: model.display_name,
            role: model.role,
            business_id: model.business_id,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BusinessView {
    pub id: i32,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    pub profile: UserProfileView,
    pub business: BusinessView,
}

/// List user profiles
#[utoipa::path(
    get,
    path = "/api/v1/users",
    summary = "List users",
    description = "User profiles of the caller's business, oldest first",
    responses(
        (status = 200, description = "Profiles retrieved successfully", body = ApiResponse<Vec<UserProfileView>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<UserProfileView>>>, ServiceError> {
    authorize(&ctx, Capability::ManageUsers)?;

    let profiles = user_profile::Entity::find()
        .filter(user_profile::Column::BusinessId.eq(ctx.business_id))
        .order_by_asc(user_profile::Column::CreatedAt)
        .all(&*state.db)
        .await?;

    let views: Vec<UserProfileView> = profiles.into_iter().map(UserProfileView::from).collect();
    Ok(Json(ApiResponse::success(views)))
}

/// Current actor's profile
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    summary = "Get current user",
    description = "The caller's own profile, role and business",
    responses(
        (status = 200, description = "Profile retrieved successfully", body = ApiResponse<CurrentUserResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn current_user(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<CurrentUserResponse>>, ServiceError> {
    let (profile, business) = user_profile::Entity::find_by_id(ctx.actor_id)
        .find_also_related(business::Entity)
        .one(&*state.db)
        .await?
        .ok_or_else(|| ServiceError::Unauthorized("No profile for authenticated actor".into()))?;

    // The FK makes a profile without a business unrepresentable; treat it as corruption.
    let business = business.ok_or_else(|| {
        ServiceError::InternalError(format!("Profile {} has no business row", profile.id))
    })?;

    Ok(Json(ApiResponse::success(CurrentUserResponse {
        profile: UserProfileView::from(profile),
        business: BusinessView {
            id: business.id,
            name: business.name,
            active: business.active,
        },
    })))
}
