//! PostgreSQL implementation of BillingCatalog.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{BillingInterval, IntervalUnit, Module, Plan};
use crate::domain::foundation::{BillingIntervalId, DomainError, PlanId};
use crate::ports::BillingCatalog;

use super::corrupt_column;

const SELECT_INTERVAL: &str = r#"
    SELECT bi.id, bi.amount, bi.interval, bi.interval_count, bi.processor_plan_id,
           p.id AS plan_id, p.name AS plan_name, p.module AS plan_module,
           p.capacity_limit AS plan_capacity_limit
    FROM billing_intervals bi
    JOIN plans p ON p.id = bi.plan_id
"#;

pub struct PostgresBillingCatalog {
    pool: PgPool,
}

impl PostgresBillingCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Billing interval joined with its plan.
#[derive(Debug, sqlx::FromRow)]
struct BillingIntervalRow {
    id: Uuid,
    amount: Decimal,
    interval: String,
    interval_count: i32,
    processor_plan_id: String,
    plan_id: Uuid,
    plan_name: String,
    plan_module: String,
    plan_capacity_limit: Option<i32>,
}

impl TryFrom<BillingIntervalRow> for BillingInterval {
    type Error = DomainError;

    fn try_from(row: BillingIntervalRow) -> Result<Self, Self::Error> {
        let module: Module = row
            .plan_module
            .parse()
            .map_err(|_| corrupt_column("plans.module", &row.plan_module))?;
        let interval: IntervalUnit = row
            .interval
            .parse()
            .map_err(|_| corrupt_column("billing_intervals.interval", &row.interval))?;
        let interval_count = u32::try_from(row.interval_count)
            .map_err(|_| corrupt_column("billing_intervals.interval_count", row.interval_count))?;
        let capacity_limit = row
            .plan_capacity_limit
            .map(|limit| {
                u32::try_from(limit).map_err(|_| corrupt_column("plans.capacity_limit", limit))
            })
            .transpose()?;

        Ok(BillingInterval {
            id: BillingIntervalId::from_uuid(row.id),
            plan: Plan {
                id: PlanId::from_uuid(row.plan_id),
                name: row.plan_name,
                module,
                capacity_limit,
            },
            amount: row.amount,
            interval,
            interval_count,
            processor_plan_id: row.processor_plan_id,
        })
    }
}

#[async_trait]
impl BillingCatalog for PostgresBillingCatalog {
    async fn find_interval(
        &self,
        id: &BillingIntervalId,
    ) -> Result<Option<BillingInterval>, DomainError> {
        let row: Option<BillingIntervalRow> =
            sqlx::query_as(&format!("{} WHERE bi.id = $1", SELECT_INTERVAL))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database("Failed to find billing interval", e))?;

        row.map(BillingInterval::try_from).transpose()
    }

    async fn list_intervals(
        &self,
        module: Option<Module>,
    ) -> Result<Vec<BillingInterval>, DomainError> {
        let rows: Vec<BillingIntervalRow> = sqlx::query_as(&format!(
            "{} WHERE ($1::text IS NULL OR p.module = $1) ORDER BY bi.amount ASC",
            SELECT_INTERVAL
        ))
        .bind(module.map(|m| m.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list billing intervals", e))?;

        rows.into_iter().map(BillingInterval::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> BillingIntervalRow {
        BillingIntervalRow {
            id: Uuid::new_v4(),
            amount: Decimal::new(1400, 2),
            interval: "month".to_string(),
            interval_count: 4,
            processor_plan_id: "staff_quarterly".to_string(),
            plan_id: Uuid::new_v4(),
            plan_name: "Staff Compliance".to_string(),
            plan_module: "staff".to_string(),
            plan_capacity_limit: None,
        }
    }

    #[test]
    fn row_converts_with_plan() {
        let interval = BillingInterval::try_from(row()).unwrap();
        assert_eq!(interval.module(), Module::Staff);
        assert_eq!(interval.to_string(), "$14.00 every 4 months");
    }

    #[test]
    fn unknown_interval_unit_is_rejected() {
        let mut row = row();
        row.interval = "fortnight".to_string();
        assert!(BillingInterval::try_from(row).is_err());
    }
}
