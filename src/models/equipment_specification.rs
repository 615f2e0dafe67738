//! Equipment specification entity model
//!
//! Reference data describing a trackable equipment variant and the alert
//! threshold new balances of its type start from.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = EquipmentSpecification)]
#[sea_orm(table_name = "equipment_specifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub equipment_type: EquipmentType,

    /// Display name, e.g. "Euro Pallet"
    pub name: String,

    pub color: Option<String>,
    pub size: Option<String>,
    pub grade: Option<String>,
    pub description: Option<String>,

    /// Threshold seeded into balances created for this equipment
    pub default_threshold: i32,

    pub is_active: bool,

    #[schema(value_type = String)]
    pub created_at: DateTimeWithTimeZone,
    #[schema(value_type = String)]
    pub updated_at: DateTimeWithTimeZone,
}

/// Kind of reusable transport equipment.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum EquipmentType {
    #[sea_orm(string_value = "pallet")]
    Pallet,
    #[sea_orm(string_value = "cage")]
    Cage,
    #[sea_orm(string_value = "dolly")]
    Dolly,
    #[sea_orm(string_value = "stillage")]
    Stillage,
    #[sea_orm(string_value = "container")]
    Container,
    #[sea_orm(string_value = "other")]
    Other,
}

impl EquipmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentType::Pallet => "pallet",
            EquipmentType::Cage => "cage",
            EquipmentType::Dolly => "dolly",
            EquipmentType::Stillage => "stillage",
            EquipmentType::Container => "container",
            EquipmentType::Other => "other",
        }
    }

    /// Case-insensitive parse of the wire name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pallet" => Some(EquipmentType::Pallet),
            "cage" => Some(EquipmentType::Cage),
            "dolly" => Some(EquipmentType::Dolly),
            "stillage" => Some(EquipmentType::Stillage),
            "container" => Some(EquipmentType::Container),
            "other" => Some(EquipmentType::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::movement::Entity")]
    Movement,
}

impl Related<super::movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_any_case() {
        assert_eq!(EquipmentType::parse("Cage"), Some(EquipmentType::Cage));
        assert_eq!(EquipmentType::parse(" PALLET "), Some(EquipmentType::Pallet));
        assert_eq!(EquipmentType::parse("trolley"), None);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&EquipmentType::Stillage).unwrap();
        assert_eq!(json, "\"stillage\"");
        let parsed: EquipmentType = serde_json::from_str("\"dolly\"").unwrap();
        assert_eq!(parsed, EquipmentType::Dolly);
    }
}
