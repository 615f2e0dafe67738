//! # Customer Repository
//!
//! CRUD over customers. Renames propagate to the balance and alert lookup
//! names; deletes are refused while balances or movements reference the
//! customer.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
    sea_query::{Expr, Func},
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::customer::{self, CustomerStatus, DEFAULT_COUNTRY, DEFAULT_PAYMENT_TERMS};
use crate::models::{Alert, Customer, CustomerBalance, Movement, alert, customer_balance, movement};

/// Request body for creating a customer
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCustomer {
    pub customer_name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub status: Option<CustomerStatus>,
    pub credit_limit: Option<i32>,
    pub payment_terms: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CustomerPatch {
    pub customer_name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub status: Option<CustomerStatus>,
    pub credit_limit: Option<i32>,
    pub payment_terms: Option<String>,
    pub notes: Option<String>,
}

pub struct CustomerRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> CustomerRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Customers ordered by name, optionally filtered by status and a
    /// case-insensitive search over name, contact and city.
    pub async fn list(
        &self,
        status: Option<CustomerStatus>,
        search: Option<&str>,
    ) -> Result<Vec<customer::Model>, RepositoryError> {
        let mut query = Customer::find();
        if let Some(status) = status {
            query = query.filter(customer::Column::Status.eq(status));
        }
        if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            let lower_like = |column: customer::Column| {
                Expr::expr(Func::lower(Expr::col(column))).like(pattern.clone())
            };
            query = query.filter(
                Condition::any()
                    .add(lower_like(customer::Column::CustomerName))
                    .add(lower_like(customer::Column::ContactPerson))
                    .add(lower_like(customer::Column::City)),
            );
        }
        Ok(query
            .order_by_asc(customer::Column::CustomerName)
            .all(self.db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<customer::Model, RepositoryError> {
        Customer::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Customer not found"))
    }

    pub async fn create(&self, request: NewCustomer) -> Result<customer::Model, RepositoryError> {
        let customer_name = validate_name(&request.customer_name)?;
        if let Some(limit) = request.credit_limit
            && limit < 0
        {
            return Err(RepositoryError::validation("credit_limit must be non-negative"));
        }
        self.ensure_name_free(&customer_name, None).await?;

        let now = Utc::now().fixed_offset();
        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_name: Set(customer_name),
            contact_person: Set(request.contact_person),
            email: Set(request.email),
            phone: Set(request.phone),
            address: Set(request.address),
            city: Set(request.city),
            postcode: Set(request.postcode),
            country: Set(Some(
                request.country.unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            )),
            status: Set(request.status.unwrap_or_default()),
            credit_limit: Set(request.credit_limit),
            payment_terms: Set(Some(
                request
                    .payment_terms
                    .unwrap_or_else(|| DEFAULT_PAYMENT_TERMS.to_string()),
            )),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await
        .map_err(|e| RepositoryError::unique_or_database(e, "customer_name"))?;

        info!(customer_id = %model.id, customer = %model.customer_name, "customer created");
        Ok(model)
    }

    /// Applies a patch. A rename rewrites the lookup name on the customer's
    /// balances and alerts in the same transaction.
    pub async fn update(
        &self,
        id: Uuid,
        patch: CustomerPatch,
    ) -> Result<customer::Model, RepositoryError> {
        let existing = self.get(id).await?;
        let rename = match patch.customer_name.as_deref() {
            Some(name) => {
                let name = validate_name(name)?;
                (name != existing.customer_name).then_some(name)
            }
            None => None,
        };
        if let Some(name) = &rename {
            self.ensure_name_free(name, Some(id)).await?;
        }
        if patch.credit_limit.is_some_and(|limit| limit < 0) {
            return Err(RepositoryError::validation("credit_limit must be non-negative"));
        }

        let now = Utc::now().fixed_offset();
        let txn = self.db.begin().await?;

        let mut active = existing.into_active_model();
        if let Some(name) = &rename {
            active.customer_name = Set(name.clone());
        }
        if let Some(v) = patch.contact_person {
            active.contact_person = Set(Some(v));
        }
        if let Some(v) = patch.email {
            active.email = Set(Some(v));
        }
        if let Some(v) = patch.phone {
            active.phone = Set(Some(v));
        }
        if let Some(v) = patch.address {
            active.address = Set(Some(v));
        }
        if let Some(v) = patch.city {
            active.city = Set(Some(v));
        }
        if let Some(v) = patch.postcode {
            active.postcode = Set(Some(v));
        }
        if let Some(v) = patch.country {
            active.country = Set(Some(v));
        }
        if let Some(v) = patch.status {
            active.status = Set(v);
        }
        if let Some(v) = patch.credit_limit {
            active.credit_limit = Set(Some(v));
        }
        if let Some(v) = patch.payment_terms {
            active.payment_terms = Set(Some(v));
        }
        if let Some(v) = patch.notes {
            active.notes = Set(Some(v));
        }
        active.updated_at = Set(now);

        let updated = active
            .update(&txn)
            .await
            .map_err(|e| RepositoryError::unique_or_database(e, "customer_name"))?;

        if let Some(name) = rename {
            CustomerBalance::update_many()
                .col_expr(customer_balance::Column::CustomerName, Expr::value(name.clone()))
                .filter(customer_balance::Column::CustomerId.eq(id))
                .exec(&txn)
                .await?;
            Alert::update_many()
                .col_expr(alert::Column::CustomerName, Expr::value(name.clone()))
                .filter(alert::Column::CustomerId.eq(id))
                .exec(&txn)
                .await?;
            info!(customer_id = %id, new_name = %name, "customer renamed");
        }

        txn.commit().await?;
        Ok(updated)
    }

    /// Hard delete, refused with the blocking counts while balances or
    /// movements reference the customer.
    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let customer = self.get(id).await?;

        let balances = CustomerBalance::find()
            .filter(customer_balance::Column::CustomerId.eq(id))
            .count(self.db)
            .await?;
        let movements = Movement::find()
            .filter(movement::Column::CustomerId.eq(id))
            .count(self.db)
            .await?;

        if balances > 0 || movements > 0 {
            return Err(RepositoryError::conflict(
                format!(
                    "Cannot delete customer. Has {balances} balances and {movements} movements. Consider setting status to 'inactive' instead."
                ),
                json!({ "balances": balances, "movements": movements }),
            ));
        }

        customer.delete(self.db).await?;
        info!(customer_id = %id, "customer deleted");
        Ok(())
    }

    async fn ensure_name_free(
        &self,
        customer_name: &str,
        except: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let mut query =
            Customer::find().filter(customer::Column::CustomerName.eq(customer_name));
        if let Some(id) = except {
            query = query.filter(customer::Column::Id.ne(id));
        }
        if query.count(self.db).await? > 0 {
            return Err(RepositoryError::duplicate("customer_name"));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<String, RepositoryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RepositoryError::validation("customer_name must not be empty"));
    }
    Ok(trimmed.to_string())
}
