use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{self as json, json};

use crate::audit::{Audit, AuditReport};
use crate::browser::evaluation::evaluate;
use crate::browser::{Page, scripts};
use crate::focus;
use crate::schema::{FieldSpec, Fields, Primitive};

const FIELDS: Fields =
    &[("withItems", FieldSpec::required(Primitive::Boolean))];

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FocusedItem {
    tag: String,
    key: String,
    text: String,
}

/// Walks the page with the keyboard and tallies the elements reached by
/// each key.
pub struct FocusAll;

#[async_trait]
impl Audit for FocusAll {
    fn name(&self) -> &'static str {
        "focAll"
    }

    fn description(&self) -> &'static str {
        "focusable elements reachable by keyboard navigation"
    }

    fn fields(&self) -> Fields {
        FIELDS
    }

    async fn report(
        &self,
        page: &dyn Page,
        arguments: &[json::Value],
    ) -> Result<AuditReport> {
        let with_items = arguments
            .first()
            .and_then(json::Value::as_bool)
            .unwrap_or(false);
        let traversal = focus::traverse(page).await?;
        let items: Vec<FocusedItem> =
            evaluate(page, scripts::FOCUS_MARKS, vec![]).await?;
        let count = |key: &str| items.iter().filter(|i| i.key == key).count();
        let mut result = json!({
            "totals": {
                "total": traversal.marked,
                "tab": count("Tab"),
                "arrowRight": count("ArrowRight"),
                "arrowDown": count("ArrowDown"),
            }
        });
        if with_items {
            result["items"] = json::to_value(&items)?;
        }
        Ok(AuditReport {
            result,
            exhibits: None,
        })
    }
}
