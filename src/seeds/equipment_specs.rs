//! Standard equipment specification catalogue

use anyhow::Result;
use sea_orm::DatabaseConnection;

use crate::models::EquipmentType;
use crate::repositories::EquipmentSpecificationRepository;
use crate::repositories::equipment_specification::NewEquipmentSpecification;

struct CatalogueEntry {
    equipment_type: EquipmentType,
    name: &'static str,
    color: &'static str,
    size: &'static str,
    grade: &'static str,
    default_threshold: i32,
}

const CATALOGUE: &[CatalogueEntry] = &[
    CatalogueEntry {
        equipment_type: EquipmentType::Pallet,
        name: "Euro Pallet",
        color: "Brown",
        size: "1200x800mm",
        grade: "Grade A",
        default_threshold: 50,
    },
    CatalogueEntry {
        equipment_type: EquipmentType::Pallet,
        name: "UK Pallet",
        color: "Brown",
        size: "1200x1000mm",
        grade: "Grade A",
        default_threshold: 40,
    },
    CatalogueEntry {
        equipment_type: EquipmentType::Cage,
        name: "Blue Cage",
        color: "Blue",
        size: "Standard",
        grade: "Heavy Duty",
        default_threshold: 30,
    },
    CatalogueEntry {
        equipment_type: EquipmentType::Cage,
        name: "Red Cage",
        color: "Red",
        size: "Standard",
        grade: "Heavy Duty",
        default_threshold: 25,
    },
    CatalogueEntry {
        equipment_type: EquipmentType::Cage,
        name: "Green Cage",
        color: "Green",
        size: "Large",
        grade: "Standard",
        default_threshold: 20,
    },
    CatalogueEntry {
        equipment_type: EquipmentType::Stillage,
        name: "Post Stillage",
        color: "Silver",
        size: "1200x1000mm",
        grade: "Industrial",
        default_threshold: 15,
    },
    CatalogueEntry {
        equipment_type: EquipmentType::Dolly,
        name: "Platform Dolly",
        color: "Black",
        size: "600x400mm",
        grade: "Standard",
        default_threshold: 35,
    },
];

/// Inserts catalogue entries whose (type, name) pair is not yet present.
/// Returns how many were created.
pub async fn seed_equipment_specs(db: &DatabaseConnection) -> Result<usize> {
    let repo = EquipmentSpecificationRepository::new(db);
    let mut created = 0;

    for entry in CATALOGUE {
        let existing = repo.list(Some(entry.equipment_type), None).await?;
        if existing.iter().any(|spec| spec.name == entry.name) {
            tracing::debug!(name = entry.name, "equipment specification already seeded");
            continue;
        }

        repo.create(NewEquipmentSpecification {
            equipment_type: entry.equipment_type,
            name: entry.name.to_string(),
            color: Some(entry.color.to_string()),
            size: Some(entry.size.to_string()),
            grade: Some(entry.grade.to_string()),
            description: None,
            default_threshold: Some(entry.default_threshold),
            is_active: Some(true),
        })
        .await?;
        created += 1;
    }

    tracing::info!(created, total = CATALOGUE.len(), "equipment specification catalogue seeded");
    Ok(created)
}
