use anyhow::Result;
use async_trait::async_trait;
use serde_json::{self as json, json};

use crate::audit::{Audit, AuditReport};
use crate::browser::evaluation::evaluate;
use crate::browser::{Page, scripts};

pub struct BodyText;

#[async_trait]
impl Audit for BodyText {
    fn name(&self) -> &'static str {
        "bodyText"
    }

    fn description(&self) -> &'static str {
        "text content of the page body"
    }

    async fn report(
        &self,
        page: &dyn Page,
        _arguments: &[json::Value],
    ) -> Result<AuditReport> {
        let text: String = evaluate(page, scripts::BODY_TEXT, vec![]).await?;
        Ok(AuditReport {
            result: json!({"bodyText": text}),
            exhibits: None,
        })
    }
}
