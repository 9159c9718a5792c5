use anyhow::Result;
use async_trait::async_trait;
use serde_json::{self as json, json};

use crate::audit::{Audit, AuditReport};
use crate::browser::evaluation::evaluate;
use crate::browser::{Page, scripts};

/// Counts the visible elements under `body`.
pub struct Bulk;

#[async_trait]
impl Audit for Bulk {
    fn name(&self) -> &'static str {
        "bulk"
    }

    fn description(&self) -> &'static str {
        "count of visible elements"
    }

    async fn report(
        &self,
        page: &dyn Page,
        _arguments: &[json::Value],
    ) -> Result<AuditReport> {
        let count: u64 = evaluate(page, scripts::VISIBLE_COUNT, vec![]).await?;
        Ok(AuditReport {
            result: json!({"visibleElements": count}),
            exhibits: None,
        })
    }
}
