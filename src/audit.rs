use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json as json;

use crate::browser::Page;
use crate::schema::Fields;

pub mod background_images;
pub mod body_text;
pub mod bulk;
pub mod focus_all;
pub mod role_list;
pub mod simple;

/// Stands in for the browser's display name in exhibits.
pub const BROWSER_TYPE_PLACEHOLDER: &str = "__browserTypeName__";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuditReport {
    pub result: json::Value,
    /// An HTML fragment to append to the report's exhibits.
    pub exhibits: Option<String>,
}

/// A named test a script can run against the current page.
#[async_trait]
pub trait Audit: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Fields a `test` act naming this audit must (or may) carry, in the
    /// order their values are passed to [`Audit::report`].
    fn fields(&self) -> Fields {
        &[]
    }

    async fn report(
        &self,
        page: &dyn Page,
        arguments: &[json::Value],
    ) -> Result<AuditReport>;
}

#[derive(Clone, Default)]
pub struct Audits {
    audits: BTreeMap<&'static str, Arc<dyn Audit>>,
}

impl Audits {
    pub fn builtin() -> Self {
        let mut audits = Audits::default();
        audits.register(simple::Simple);
        audits.register(bulk::Bulk);
        audits.register(body_text::BodyText);
        audits.register(focus_all::FocusAll);
        audits.register(role_list::RoleList);
        audits.register(background_images::BackgroundImages);
        audits
    }

    pub fn register(&mut self, audit: impl Audit + 'static) {
        self.audits.insert(audit.name(), Arc::new(audit));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Audit> {
        self.audits.get(name).map(|audit| audit.as_ref())
    }
}
