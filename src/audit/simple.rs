use anyhow::Result;
use async_trait::async_trait;
use serde_json::{self as json, json};

use crate::audit::{Audit, AuditReport};
use crate::browser::Page;

pub struct Simple;

#[async_trait]
impl Audit for Simple {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn description(&self) -> &'static str {
        "perfunctory test for testing the test runner"
    }

    async fn report(
        &self,
        _page: &dyn Page,
        _arguments: &[json::Value],
    ) -> Result<AuditReport> {
        Ok(AuditReport {
            result: json!({"success": true}),
            exhibits: None,
        })
    }
}
