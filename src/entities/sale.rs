use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a sale, persisted as a single tagged state.
///
/// `Pending` waits for admin approval and has had no stock applied.
/// `Approved` has had its stock decrement committed. `Rejected` is a
/// soft-deleted pending sale (stock was never applied, so nothing to
/// revert). `Deactivated` is a soft-deleted approved sale whose stock was
/// restored by the destroy path; only this state can be reactivated.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    strum::Display, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum SaleState {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Approved")]
    Approved,
    #[sea_orm(string_value = "Rejected")]
    Rejected,
    #[sea_orm(string_value = "Deactivated")]
    Deactivated,
}

impl SaleState {
    /// Devices still speak the legacy two-boolean encoding; both flags are
    /// derived from the state so the illegal combinations cannot occur.
    pub fn is_active(&self) -> bool {
        matches!(self, SaleState::Pending | SaleState::Approved)
    }

    pub fn is_pending_approval(&self) -> bool {
        matches!(self, SaleState::Pending)
    }
}

/// A sale pushed from a device or created directly through the API.
///
/// The primary key is the client-generated uuid, which makes retries of the
/// same push resolve to the same row. Stock effects are applied at most once
/// per sale, on creation (admin origin) or on approval (worker origin).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: i32,
    pub total: Decimal,
    pub state: SaleState,
    pub synced_from_device: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::business::Entity",
        from = "Column::BusinessId",
        to = "super::business::Column::Id"
    )]
    Business,
    #[sea_orm(has_many = "super::sale_item::Entity")]
    SaleItems,
}

impl Related<super::business::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Business.def()
    }
}

impl Related<super::sale_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SaleItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_flags_cover_every_state() {
        assert!(SaleState::Pending.is_active());
        assert!(SaleState::Pending.is_pending_approval());
        assert!(SaleState::Approved.is_active());
        assert!(!SaleState::Approved.is_pending_approval());
        assert!(!SaleState::Rejected.is_active());
        assert!(!SaleState::Deactivated.is_active());
        assert!(!SaleState::Deactivated.is_pending_approval());
    }
}
