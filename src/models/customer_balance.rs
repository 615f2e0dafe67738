//! Customer balance entity model
//!
//! Derived, mutable on-hand quantity of one equipment type at one customer.
//! Exactly one row exists per (customer_id, equipment_type).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::equipment_specification::EquipmentType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = CustomerBalance)]
#[sea_orm(table_name = "customer_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub customer_id: Uuid,

    /// Secondary lookup key, rewritten when the customer is renamed
    pub customer_name: String,

    pub equipment_type: EquipmentType,

    /// Signed; negative when more was collected than recorded as delivered
    pub current_balance: i32,

    pub threshold: i32,

    #[schema(value_type = Option<String>)]
    pub last_movement: Option<DateTimeWithTimeZone>,

    pub status: BalanceStatus,

    #[schema(value_type = String)]
    pub created_at: DateTimeWithTimeZone,
    #[schema(value_type = String)]
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum BalanceStatus {
    #[sea_orm(string_value = "normal")]
    #[default]
    Normal,
    #[sea_orm(string_value = "over_threshold")]
    OverThreshold,
    #[sea_orm(string_value = "negative")]
    Negative,
}

impl BalanceStatus {
    /// Whether a balance in this state needs an open alert.
    pub fn is_breach(self) -> bool {
        !matches!(self, BalanceStatus::Normal)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
