use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entities::coupon::{self, Entity as CouponEntity, Model as CouponModel};
use crate::errors::ServiceError;
use crate::models::DiscountType;

/// Normalizes a customer-typed code to its stored form.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Looks up a coupon case-insensitively. Usable inside a transaction.
pub async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<CouponModel>, ServiceError> {
    let normalized = normalize_code(code);
    let found = CouponEntity::find()
        .filter(coupon::Column::Code.eq(normalized))
        .one(conn)
        .await?;
    Ok(found)
}

/// Atomically consumes one use of a coupon.
///
/// The increment is guarded in SQL: it only lands while the coupon is active
/// and under its `max_uses` cap, so two racing checkouts cannot both take the
/// last use. Runs inside the order-creation transaction, so an abandoned
/// checkout never burns a use.
pub async fn redeem<C: ConnectionTrait>(conn: &C, code: &str) -> Result<(), ServiceError> {
    let normalized = normalize_code(code);
    let result = CouponEntity::update_many()
        .col_expr(
            coupon::Column::TimesUsed,
            Expr::col(coupon::Column::TimesUsed).add(1),
        )
        .filter(coupon::Column::Code.eq(normalized.clone()))
        .filter(coupon::Column::IsActive.eq(true))
        .filter(
            Condition::any()
                .add(coupon::Column::MaxUses.is_null())
                .add(Expr::col(coupon::Column::TimesUsed).lt(Expr::col(coupon::Column::MaxUses))),
        )
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Validation(format!(
            "Coupon {normalized} is no longer redeemable"
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpsertCouponRequest {
    #[validate(length(min = 1, max = 30, message = "Code must be between 1 and 30 characters"))]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase_amount: Option<Decimal>,
    pub max_uses: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl UpsertCouponRequest {
    fn check(&self) -> Result<(), ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        if self.discount_value < Decimal::ZERO {
            return Err(ServiceError::Validation(
                "Discount value cannot be negative".to_string(),
            ));
        }
        if self.discount_type == DiscountType::Percentage
            && self.discount_value > Decimal::from(100)
        {
            return Err(ServiceError::Validation(
                "Percentage discount cannot exceed 100".to_string(),
            ));
        }
        if matches!(self.max_uses, Some(n) if n < 1) {
            return Err(ServiceError::Validation(
                "max_uses must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Admin-facing coupon management.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: UpsertCouponRequest) -> Result<CouponModel, ServiceError> {
        request.check()?;
        let code = normalize_code(&request.code);

        if find_by_code(&*self.db, &code).await?.is_some() {
            return Err(ServiceError::Validation(format!(
                "Coupon {code} already exists"
            )));
        }

        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_type: Set(request.discount_type.to_string()),
            discount_value: Set(request.discount_value),
            min_purchase_amount: Set(request.min_purchase_amount),
            max_uses: Set(request.max_uses),
            times_used: Set(0),
            is_active: Set(request.is_active),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(code = %code, "Coupon created");
        Ok(model)
    }

    #[instrument(skip(self, request), fields(coupon_id = %id))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpsertCouponRequest,
    ) -> Result<CouponModel, ServiceError> {
        request.check()?;
        let existing = CouponEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {id} not found")))?;

        let mut active: coupon::ActiveModel = existing.into();
        active.code = Set(normalize_code(&request.code));
        active.discount_type = Set(request.discount_type.to_string());
        active.discount_value = Set(request.discount_value);
        active.min_purchase_amount = Set(request.min_purchase_amount);
        active.max_uses = Set(request.max_uses);
        active.is_active = Set(request.is_active);

        let updated = active.update(&*self.db).await?;
        info!(code = %updated.code, "Coupon updated");
        Ok(updated)
    }

    #[instrument(skip(self), fields(coupon_id = %id))]
    pub async fn set_active(&self, id: Uuid, is_active: bool) -> Result<CouponModel, ServiceError> {
        let existing = CouponEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {id} not found")))?;

        let mut active: coupon::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        let updated = active.update(&*self.db).await?;
        info!(code = %updated.code, is_active, "Coupon activity toggled");
        Ok(updated)
    }

    #[instrument(skip(self), fields(coupon_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = CouponEntity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Coupon {id} not found")));
        }
        info!(coupon_id = %id, "Coupon deleted");
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<CouponModel>, ServiceError> {
        let coupons = CouponEntity::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(coupons)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        find_by_code(&*self.db, code).await
    }
}
