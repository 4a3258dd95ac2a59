/*!
 * # Authentication and Authorization Module
 *
 * Token issuance lives outside this service; requests arrive with a JWT
 * whose subject is the actor id. This module validates the token, loads the
 * actor's profile (business + role) and hands every handler an explicit
 * [`RequestContext`]; no ambient actor state anywhere in the core.
 *
 * Role checks go through a single capability table ([`UserRole::can`] +
 * [`authorize`]) instead of per-endpoint role string comparisons.
 */

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    entities::user_profile::{self, UserRole},
    errors::ServiceError,
    AppState,
};

/// Claim structure for JWT tokens. The subject is the actor id; role and
/// business are deliberately NOT in the token: they come from the actor's
/// profile row, so a role change takes effect without re-issuing tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (actor ID)
    pub jti: String, // JWT ID
    pub iat: i64,    // Issued at time
    pub exp: i64,    // Expiration time
    pub nbf: i64,    // Not valid before time
    pub iss: String, // Issuer
    pub aud: String, // Audience
}

/// Authentication configuration for token validation.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, jwt_audience: String, jwt_issuer: String) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.jwt_audience.clone()]);
        validation.set_issuer(&[self.jwt_issuer.clone()]);
        validation
    }

    /// Decode and validate a bearer token, returning its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &self.validation(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ServiceError::Unauthorized("Token has expired".to_string())
            }
            _ => ServiceError::Unauthorized("Invalid authentication token".to_string()),
        })
    }
}

/// Authenticated actor identity extracted from the JWT token. Carries no
/// business or role; see [`RequestContext`] for the profile-resolved view.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub actor_id: Uuid,
    pub token_id: String,
}

/// Everything a core operation needs to know about the caller: who, which
/// business, and with what role. Built once per request from the token plus
/// the actor's profile row and passed explicitly into every service call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor_id: Uuid,
    pub business_id: i32,
    pub role: UserRole,
    pub display_name: String,
}

impl RequestContext {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_worker(&self) -> bool {
        self.role == UserRole::Worker
    }
}

/// What an actor is allowed to do. One table instead of scattered
/// `role == "admin"` comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Push product batches from a device.
    SyncProducts,
    /// Push sale batches from a device.
    SyncSales,
    /// Read the product catalog.
    ViewProducts,
    /// Read non-pending sales (workers: own sales only).
    ViewSales,
    /// Read any sale of the business, including deactivated ones.
    ViewAllSales,
    /// Create, update or soft-delete products directly.
    ManageCatalog,
    /// Approve, reject, reactivate or destroy sales.
    ApproveSales,
    /// Read the pending-sales rollup.
    ViewPendingReport,
    /// List the business's user profiles.
    ManageUsers,
}

impl UserRole {
    pub fn can(&self, capability: Capability) -> bool {
        match self {
            UserRole::Admin => true,
            UserRole::Worker => matches!(
                capability,
                Capability::SyncProducts
                    | Capability::SyncSales
                    | Capability::ViewProducts
                    | Capability::ViewSales
            ),
        }
    }
}

/// Central authorization check. Every handler calls this before touching a
/// service; the error names the missing capability, not the role.
pub fn authorize(ctx: &RequestContext, capability: Capability) -> Result<(), ServiceError> {
    if ctx.role.can(capability) {
        Ok(())
    } else {
        debug!(
            actor_id = %ctx.actor_id,
            role = %ctx.role,
            ?capability,
            "authorization denied"
        );
        Err(ServiceError::Forbidden(format!(
            "{:?} requires elevated permissions",
            capability
        )))
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, ServiceError> {
    let header_value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ServiceError::Unauthorized("Missing authorization header".to_string()))?;
    let value = header_value
        .to_str()
        .map_err(|_| ServiceError::Unauthorized("Malformed authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| ServiceError::Unauthorized("Expected bearer token".to_string()))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = bearer_token(parts)?;
        let claims = app_state.config.auth().validate_token(token)?;

        let actor_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Token subject is not an id".to_string()))?;

        Ok(AuthUser {
            actor_id,
            token_id: claims.jti,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_user = AuthUser::from_request_parts(parts, state).await?;
        let app_state = AppState::from_ref(state);

        let profile = user_profile::Entity::find_by_id(auth_user.actor_id)
            .one(&*app_state.db)
            .await?
            .ok_or_else(|| {
                ServiceError::Unauthorized("No profile for authenticated actor".to_string())
            })?;

        Ok(RequestContext {
            actor_id: profile.id,
            business_id: profile.business_id,
            role: profile.role,
            display_name: profile.display_name,
        })
    }
}
