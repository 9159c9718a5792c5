use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{self as json, json};

use crate::audit::{Audit, AuditReport};
use crate::browser::evaluation::evaluate;
use crate::browser::{Page, scripts};
use crate::schema::{FieldSpec, Fields, Primitive, Subtype};

const FIELDS: Fields = &[(
    "roles",
    FieldSpec::optional(Primitive::List).with(Subtype::Strings),
)];

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RoleItem {
    index: usize,
    tag: String,
    role: String,
}

pub struct RoleList;

#[async_trait]
impl Audit for RoleList {
    fn name(&self) -> &'static str {
        "roleList"
    }

    fn description(&self) -> &'static str {
        "elements with explicit roles"
    }

    fn fields(&self) -> Fields {
        FIELDS
    }

    async fn report(
        &self,
        page: &dyn Page,
        arguments: &[json::Value],
    ) -> Result<AuditReport> {
        let roles: Option<Vec<String>> = match arguments.first() {
            Some(json::Value::Null) | None => None,
            Some(roles) => Some(json::from_value(roles.clone())?),
        };
        let mut items: Vec<RoleItem> =
            evaluate(page, scripts::ROLES, vec![]).await?;
        if let Some(roles) = roles {
            items.retain(|item| roles.contains(&item.role));
        }
        Ok(AuditReport {
            result: json!({"total": items.len(), "items": items}),
            exhibits: None,
        })
    }
}
