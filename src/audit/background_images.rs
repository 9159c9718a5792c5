use anyhow::Result;
use async_trait::async_trait;
use serde_json::{self as json, json};

use crate::audit::{Audit, AuditReport, BROWSER_TYPE_PLACEHOLDER};
use crate::browser::evaluation::evaluate;
use crate::browser::{Page, scripts};

/// Collects CSS background images, which carry no text alternative, and
/// shows them in the exhibits for a reviewer to judge.
pub struct BackgroundImages;

#[async_trait]
impl Audit for BackgroundImages {
    fn name(&self) -> &'static str {
        "imgBg"
    }

    fn description(&self) -> &'static str {
        "background images"
    }

    async fn report(
        &self,
        page: &dyn Page,
        _arguments: &[json::Value],
    ) -> Result<AuditReport> {
        let urls: Vec<String> =
            evaluate(page, scripts::BACKGROUND_IMAGES, vec![]).await?;
        Ok(AuditReport {
            exhibits: Some(exhibits(&urls)),
            result: json!({"total": urls.len(), "urls": urls}),
        })
    }
}

fn exhibits(urls: &[String]) -> String {
    let mut html = format!(
        "<h3>Background images ({})</h3>\n",
        BROWSER_TYPE_PLACEHOLDER
    );
    if urls.is_empty() {
        html.push_str("<p>None</p>\n");
        return html;
    }
    html.push_str("<ul>\n");
    for url in urls {
        let url = escape_attribute(url);
        html.push_str(&format!(
            "  <li><img src=\"{}\" alt=\"\"> {}</li>\n",
            url, url
        ));
    }
    html.push_str("</ul>\n");
    html
}

fn escape_attribute(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
