//! Movement entity model
//!
//! One directional quantity event between the depot and a customer. Rows are
//! append-only; only `verified` is ever flipped after insert.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::equipment_specification::EquipmentType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = Movement)]
#[sea_orm(table_name = "movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning customer
    pub customer_id: Uuid,

    /// Customer name as recorded on the delivery note
    pub customer_name: String,

    pub equipment_type: EquipmentType,

    pub equipment_spec_id: Option<Uuid>,
    pub equipment_name: Option<String>,
    pub equipment_color: Option<String>,
    pub equipment_size: Option<String>,
    pub equipment_grade: Option<String>,

    /// Always positive; the sign comes from `direction`
    pub quantity: i32,

    pub direction: Direction,

    #[schema(value_type = String)]
    pub timestamp: DateTimeWithTimeZone,

    pub driver_name: Option<String>,

    /// Extraction confidence in [0.0, 1.0]; absent for manual entries
    pub confidence_score: Option<f64>,

    pub verified: bool,

    pub notes: Option<String>,

    /// Digest of the delivery-note image this movement was read from
    pub source_image_ref: Option<String>,

    #[schema(value_type = String)]
    pub created_at: DateTimeWithTimeZone,
}

/// `in` delivers equipment to the customer, `out` collects it back.
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
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Direction {
    #[sea_orm(string_value = "in")]
    #[serde(rename = "in")]
    In,
    #[sea_orm(string_value = "out")]
    #[serde(rename = "out")]
    Out,
}

impl Direction {
    /// Signed contribution of `quantity` to the customer's balance.
    pub fn signed(self, quantity: i32) -> i32 {
        match self {
            Direction::In => quantity,
            Direction::Out => -quantity,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
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

    #[sea_orm(
        belongs_to = "super::equipment_specification::Entity",
        from = "Column::EquipmentSpecId",
        to = "super::equipment_specification::Column::Id"
    )]
    EquipmentSpecification,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::equipment_specification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EquipmentSpecification.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
