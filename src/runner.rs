use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ::url::Url;
use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use serde_json::{self as json, json};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::act::{Act, Command, MoveKind, Waitable};
use crate::audit::{Audits, BROWSER_TYPE_PLACEHOLDER};
use crate::browser::keys::Key;
use crate::browser::{
    BrowserType, Driver, DriverError, Page, Session, WaitUntil, scripts,
};
use crate::document::{Batch, DIRNAME_PLACEHOLDER, Script};
use crate::report::{Checkpoint, NO_BATCH, Report, ReportWriter};
use crate::resolver;
use crate::schema;
use crate::score::Scorers;

const NO_PAGE_IDENTIFIED: &str = "NO PAGE IDENTIFIED";
const PAGE_HAS_NO_URL: &str = "PAGE HAS NO URL";
const INVALID_COMMAND_TYPE: &str = "INVALID COMMAND TYPE";
const NOT_FOUND: &str = "NOT FOUND";
const OPTION_NOT_FOUND: &str = "OPTION NOT FOUND";
const NONE: &str = "NONE";
const BLANK: &str = "about:blank";

#[derive(Clone, Debug)]
pub struct Timeouts {
    pub navigation: Duration,
    pub wait: Duration,
    pub new_page: Duration,
    pub load: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            navigation: Duration::from_secs(40),
            wait: Duration::from_secs(20),
            new_page: Duration::from_secs(20),
            load: Duration::from_secs(20),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub wait_until: WaitUntil,
    pub timeouts: Timeouts,
    /// Substituted for `__dirname` in visited URLs.
    pub base_directory: PathBuf,
}

/// The tests and scorers scripts can name.
#[derive(Clone, Default)]
pub struct Modules {
    pub audits: Audits,
    pub scorers: Scorers,
}

impl Modules {
    pub fn builtin() -> Self {
        Modules {
            audits: Audits::builtin(),
            scorers: Scorers::builtin(),
        }
    }
}

#[derive(Default)]
struct RunContext {
    session: Option<Box<dyn Session>>,
    page: Option<Box<dyn Page>>,
}

impl RunContext {
    fn browser_type(&self) -> Option<BrowserType> {
        self.session.as_ref().map(|session| session.browser_type())
    }

    async fn close(&mut self) {
        self.page = None;
        if let Some(mut session) = self.session.take() {
            if let Err(error) = session.close().await {
                warn!("closing the browser failed: {}", error);
            }
        }
    }
}

/// Interprets the acts of a report, one at a time, writing each act's
/// outcome back into it.
pub struct Runner {
    driver: Arc<dyn Driver>,
    modules: Arc<Modules>,
    options: RunOptions,
}

impl Runner {
    pub fn new(
        driver: Arc<dyn Driver>,
        modules: Arc<Modules>,
        options: RunOptions,
    ) -> Self {
        Runner {
            driver,
            modules,
            options,
        }
    }

    /// Performs every act in order and checkpoints the report after each
    /// one. Failures of individual acts are recorded as their results; only
    /// a failing checkpoint ends the run early.
    pub async fn run(
        &self,
        report: &mut Report,
        checkpoint: &mut dyn Checkpoint,
    ) -> Result<()> {
        let mut context = RunContext::default();
        let outcome = self.run_acts(&mut context, report, checkpoint).await;
        context.close().await;
        outcome
    }

    async fn run_acts(
        &self,
        context: &mut RunContext,
        report: &mut Report,
        checkpoint: &mut dyn Checkpoint,
    ) -> Result<()> {
        let count = report.acts.len();
        for index in 0..count {
            let result = self.perform(context, report, index).await;
            info!(
                "act {}/{} ({}): {}",
                index + 1,
                count,
                report.acts[index].kind().unwrap_or("?"),
                summary(&result)
            );
            report.acts[index].set_result(result);
            checkpoint.save(report).await?;
        }
        Ok(())
    }

    async fn perform(
        &self,
        context: &mut RunContext,
        report: &mut Report,
        index: usize,
    ) -> json::Value {
        let act = &report.acts[index];
        if !schema::is_valid(act, &self.modules.audits) {
            let kind = act.kind().unwrap_or("none");
            return json!(format!("INVALID COMMAND OF TYPE {}", kind));
        }
        let Some(command) = Command::from_act(act) else {
            return json!(INVALID_COMMAND_TYPE);
        };
        match self.execute(context, report, index, command).await {
            Ok(result) => result,
            Err(error) => {
                warn!("act {} failed: {}", index + 1, error);
                json!(format!("ERROR: {}", error))
            }
        }
    }

    async fn execute(
        &self,
        context: &mut RunContext,
        report: &mut Report,
        index: usize,
        command: Command,
    ) -> Result<json::Value, DriverError> {
        match command {
            Command::Launch { browser } => {
                return Ok(self.launch(context, browser).await);
            }
            Command::Score { name } => {
                return Ok(self.score(&name, &report.acts));
            }
            Command::Page if context.page.is_some() => {
                return Ok(self.adopt_new_page(context).await);
            }
            _ => {}
        }
        let browser_type = context.browser_type();
        let Some(page) = context.page.as_deref() else {
            return Ok(json!(NO_PAGE_IDENTIFIED));
        };
        match command {
            Command::Url { url } => return Ok(self.visit(page, &url).await),
            Command::Wait { target, text } => {
                return Ok(self.wait(page, target, &text).await);
            }
            _ => {}
        }

        let url = page.url().await?;
        if url.is_empty() || url == BLANK {
            return Ok(json!(PAGE_HAS_NO_URL));
        }
        report.acts[index].set("url", json!(url));
        match command {
            Command::Reveal => {
                let revealed: json::Value = page
                    .evaluate_function(scripts::REVEAL, vec![])
                    .await?;
                debug!("revealed {} elements", revealed);
                Ok(json!("All elements visible."))
            }
            Command::Test { name } => {
                self.test(page, browser_type, report, index, &name).await
            }
            Command::Move { kind, which, what } => {
                self.move_to(page, kind, &which, what.as_deref()).await
            }
            Command::Launch { .. }
            | Command::Score { .. }
            | Command::Page
            | Command::Url { .. }
            | Command::Wait { .. } => Ok(json!(INVALID_COMMAND_TYPE)),
        }
    }

    async fn launch(
        &self,
        context: &mut RunContext,
        browser: BrowserType,
    ) -> json::Value {
        context.close().await;
        match self.open(browser).await {
            Ok((session, page)) => {
                context.session = Some(session);
                context.page = Some(page);
                json!(format!("{} launched", browser.display_name()))
            }
            Err(error) => {
                error!("launching {} failed: {}", browser, error);
                json!(format!("ERROR LAUNCHING {}: {}", browser, error))
            }
        }
    }

    async fn open(
        &self,
        browser: BrowserType,
    ) -> Result<(Box<dyn Session>, Box<dyn Page>), DriverError> {
        let mut session = self.driver.launch(browser).await?;
        let page = match session.new_page().await {
            Ok(page) => page,
            Err(error) => {
                if let Err(error) = session.close().await {
                    warn!("closing the browser failed: {}", error);
                }
                return Err(error);
            }
        };
        if let Err(error) =
            page.wait_for_network_idle(self.options.timeouts.load).await
        {
            warn!("new page did not settle: {}", error);
        }
        Ok((session, page))
    }

    async fn visit(&self, page: &dyn Page, which: &str) -> json::Value {
        let resolved = which.replace(
            DIRNAME_PLACEHOLDER,
            &self.options.base_directory.to_string_lossy(),
        );
        match self.navigate(page, &resolved).await {
            Ok(url) => json!(url),
            Err(error) => {
                warn!("visiting {} failed: {}", resolved, error);
                if let Err(error) = page
                    .goto(
                        BLANK,
                        self.options.timeouts.navigation,
                        WaitUntil::DomContentLoaded,
                    )
                    .await
                {
                    error!("returning to a blank page failed: {}", error);
                }
                json!(format!("ERROR VISITING {}: {}", resolved, error))
            }
        }
    }

    async fn navigate(
        &self,
        page: &dyn Page,
        resolved: &str,
    ) -> Result<String, DriverError> {
        let url = Url::parse(resolved).map_err(|error| {
            DriverError::Navigation(format!("invalid URL: {}", error))
        })?;
        page.goto(
            url.as_str(),
            self.options.timeouts.navigation,
            self.options.wait_until,
        )
        .await?;
        // Dismiss any modal dialog the page opened.
        page.press_key(Key::Escape).await?;
        page.url().await
    }

    async fn wait(
        &self,
        page: &dyn Page,
        target: Waitable,
        text: &str,
    ) -> json::Value {
        let waited = async {
            page.wait_for_function(
                scripts::WAIT_FOR,
                vec![json!(target.name()), json!(text)],
                self.options.timeouts.wait,
            )
            .await?;
            page.url().await
        };
        match waited.await {
            Ok(url) => json!(url),
            Err(error) => json!(format!(
                "ERROR WAITING FOR {} TO INCLUDE \"{}\": {}",
                target.name(),
                text,
                error
            )),
        }
    }

    async fn adopt_new_page(&self, context: &mut RunContext) -> json::Value {
        let Some(session) = context.session.as_deref() else {
            return json!(NO_PAGE_IDENTIFIED);
        };
        let page = match session
            .wait_for_new_page(self.options.timeouts.new_page)
            .await
        {
            Ok(page) => page,
            Err(error) => {
                return json!(format!("ERROR AWAITING NEW PAGE: {}", error));
            }
        };
        let settled = async {
            page.wait_for_network_idle(self.options.timeouts.load)
                .await?;
            page.url().await
        };
        let result = match settled.await {
            Ok(url) => json!({"url": url}),
            Err(error) => json!(format!("ERROR AWAITING NEW PAGE: {}", error)),
        };
        context.page = Some(page);
        result
    }

    async fn test(
        &self,
        page: &dyn Page,
        browser_type: Option<BrowserType>,
        report: &mut Report,
        index: usize,
        name: &str,
    ) -> Result<json::Value, DriverError> {
        let Some(audit) = self.modules.audits.get(name) else {
            return Ok(json!(INVALID_COMMAND_TYPE));
        };
        let act = &mut report.acts[index];
        act.set("what", json!(audit.description()));
        let arguments: Vec<json::Value> = audit
            .fields()
            .iter()
            .map(|(field, _)| {
                act.field(field).cloned().unwrap_or(json::Value::Null)
            })
            .collect();

        let started = Instant::now();
        let outcome = audit.report(page, &arguments).await;
        report.record_test_time(name, whole_seconds(started.elapsed()));

        let audit_report = match outcome {
            Ok(audit_report) => audit_report,
            Err(error) => {
                warn!("test {} failed: {:#}", name, error);
                return Ok(json!(format!(
                    "ERROR RUNNING TEST {}: {:#}",
                    name, error
                )));
            }
        };
        if let Some(exhibits) = &audit_report.exhibits {
            let display_name =
                browser_type.map_or("", |browser| browser.display_name());
            report.append_exhibits(
                &exhibits.replace(BROWSER_TYPE_PLACEHOLDER, display_name),
            );
            report.acts[index].set("exhibits", json!("appended"));
        }
        let has_keys = audit_report
            .result
            .as_object()
            .is_some_and(|result| !result.is_empty());
        Ok(if has_keys {
            audit_report.result
        } else {
            json!(NONE)
        })
    }

    async fn move_to(
        &self,
        page: &dyn Page,
        kind: MoveKind,
        which: &str,
        what: Option<&str>,
    ) -> Result<json::Value, DriverError> {
        let Some(selector) = kind.selector(what) else {
            return Ok(json!(INVALID_COMMAND_TYPE));
        };
        let Some(index) = resolver::resolve(page, &selector, which).await?
        else {
            return Ok(json!(NOT_FOUND));
        };
        let Some(element) = page.nth_element(&selector, index).await? else {
            return Ok(json!(NOT_FOUND));
        };
        element.focus().await?;
        let result = match kind {
            MoveKind::Focus => json!("focused"),
            MoveKind::Text => {
                element.type_text(what.unwrap_or_default()).await?;
                json!("entered")
            }
            MoveKind::Radio | MoveKind::Checkbox => {
                element.check().await?;
                json!("checked")
            }
            MoveKind::Select => {
                match element.select_option(what.unwrap_or_default()).await? {
                    Some(option) => json!(option),
                    None => json!(OPTION_NOT_FOUND),
                }
            }
            MoveKind::Button => {
                element.click().await?;
                json!("clicked")
            }
            MoveKind::Link => {
                let href = element.attribute("href").await?;
                let target = element.attribute("target").await?;
                element.click().await?;
                json!({
                    "href": href.unwrap_or_else(|| NONE.to_string()),
                    "target": target.unwrap_or_else(|| NONE.to_string()),
                    "move": "clicked",
                })
            }
        };
        Ok(result)
    }

    fn score(&self, name: &str, acts: &[Act]) -> json::Value {
        let Some(scorer) = self.modules.scorers.get(name) else {
            return json!(format!("ERROR: no scorer named {}", name));
        };
        scorer
            .score(acts)
            .unwrap_or_else(|error| json!(format!("ERROR: {:#}", error)))
    }
}

fn whole_seconds(elapsed: Duration) -> u64 {
    u64::try_from((elapsed.as_millis() + 500) / 1000).unwrap_or(u64::MAX)
}

fn summary(result: &json::Value) -> String {
    match result {
        json::Value::String(text) => text.clone(),
        other => {
            let text = other.to_string();
            match text.char_indices().nth(80) {
                Some((end, _)) => format!("{}...", &text[..end]),
                None => text,
            }
        }
    }
}

/// Runs a script and writes its report to `report_directory`.
pub async fn run_script(
    runner: &Runner,
    script: &Script,
    report_directory: &Path,
    time_stamp: &str,
) -> Result<Report> {
    let mut report = Report::new(
        &script.name,
        NO_BATCH,
        &script.what,
        time_stamp,
        script.commands.clone(),
    );
    let mut writer =
        ReportWriter::initialize(report_directory, time_stamp, None).await?;
    runner.run(&mut report, &mut writer).await?;
    Ok(report)
}

/// Runs a script once per host of a batch, concurrently, each host with its
/// own browser and report. Results are in host order.
pub async fn run_batch(
    runner: Arc<Runner>,
    script: &Script,
    batch: &Batch,
    report_directory: &Path,
    time_stamp: &str,
) -> Vec<Result<Report>> {
    let mut tasks = JoinSet::new();
    for (index, host) in batch.hosts.iter().enumerate() {
        info!("starting {} ({})", host.what, host.which);
        let runner = runner.clone();
        let directory = report_directory.to_path_buf();
        let time_stamp = time_stamp.to_string();
        let mut report = Report::new(
            &script.name,
            &batch.name,
            &script.what,
            &time_stamp,
            script.commands_for(host),
        );
        tasks.spawn(async move {
            let outcome = async {
                let mut writer = ReportWriter::initialize(
                    &directory,
                    &time_stamp,
                    Some(index),
                )
                .await?;
                runner.run(&mut report, &mut writer).await?;
                Ok::<Report, anyhow::Error>(report)
            }
            .await;
            (index, outcome)
        });
    }

    let mut reports: Vec<Option<Result<Report>>> =
        batch.hosts.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                if let Err(error) = &outcome {
                    error!("host {} failed: {:#}", index, error);
                }
                if let Some(slot) = reports.get_mut(index) {
                    *slot = Some(outcome);
                }
            }
            Err(error) => error!("host task did not complete: {}", error),
        }
    }
    reports
        .into_iter()
        .map(|report| {
            report.unwrap_or_else(|| Err(anyhow!("host task did not complete")))
        })
        .collect()
}
