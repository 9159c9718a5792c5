use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::target::{
    EventTargetCreated, TargetId,
};
use chromiumoxide::cdp::browser_protocol::{emulation, input, page};
use chromiumoxide::cdp::js_protocol::runtime;
use chromiumoxide::error::CdpError;
use chromiumoxide::BrowserConfig;
use futures::StreamExt;
use serde_json as json;
use tempfile::TempDir;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};

use crate::browser::evaluation::{
    function_call_expression, remote_object_to_json, returned_value,
};
use crate::browser::keys::Key;
use crate::browser::{
    BrowserType, Driver, DriverError, Element, Page, Session, WaitUntil,
    scripts,
};

const PAGE_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl From<CdpError> for DriverError {
    fn from(value: CdpError) -> Self {
        DriverError::Protocol(value.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct BrowserOptions {
    pub headless: bool,
    pub width: u16,
    pub height: u16,
    pub no_sandbox: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        BrowserOptions {
            headless: true,
            width: 1024,
            height: 768,
            no_sandbox: false,
        }
    }
}

/// Drives Chromium over the DevTools protocol. Every launch gets a fresh
/// profile directory, removed when the session is dropped.
pub struct ChromiumDriver {
    options: BrowserOptions,
}

impl ChromiumDriver {
    pub fn new(options: BrowserOptions) -> Self {
        ChromiumDriver { options }
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn launch(
        &self,
        browser_type: BrowserType,
    ) -> Result<Box<dyn Session>, DriverError> {
        if browser_type != BrowserType::Chromium {
            return Err(DriverError::Unsupported(format!(
                "{} cannot be driven over the DevTools protocol",
                browser_type
            )));
        }
        let user_data_directory = TempDir::new()?;
        let config = browser_options_to_config(
            &self.options,
            user_data_directory.path(),
        )?;
        let (browser, mut handler) =
            chromiumoxide::Browser::launch(config).await?;

        let handler_task = tokio::spawn(async move {
            while let Some(result) = handler.next().await {
                if let Err(error) = result {
                    log::debug!("browser handler error: {}", error);
                }
            }
        });

        let (created_sender, created_receiver) = mpsc::unbounded_channel();
        let mut created = browser.event_listener::<EventTargetCreated>().await?;
        let listener_task = tokio::spawn(async move {
            while let Some(event) = created.next().await {
                if event.target_info.r#type != "page" {
                    continue;
                }
                if created_sender
                    .send(event.target_info.target_id.clone())
                    .is_err()
                {
                    break;
                }
            }
        });

        let mut adopted = HashSet::new();
        for page in browser.pages().await? {
            adopted.insert(page.target_id().inner().clone());
        }

        log::info!("launched {}", browser_type);
        Ok(Box::new(ChromiumSession {
            browser,
            options: self.options.clone(),
            created: Mutex::new(created_receiver),
            adopted: Mutex::new(adopted),
            tasks: vec![handler_task, listener_task],
            _user_data_directory: user_data_directory,
        }))
    }
}

struct ChromiumSession {
    browser: chromiumoxide::Browser,
    options: BrowserOptions,
    created: Mutex<mpsc::UnboundedReceiver<TargetId>>,
    adopted: Mutex<HashSet<String>>,
    tasks: Vec<JoinHandle<()>>,
    _user_data_directory: TempDir,
}

impl ChromiumSession {
    async fn find_page(
        &self,
        target_id: &TargetId,
    ) -> Result<Option<chromiumoxide::Page>, DriverError> {
        Ok(self
            .browser
            .pages()
            .await?
            .into_iter()
            .find(|page| page.target_id() == target_id))
    }

    async fn attach(
        &self,
        page: chromiumoxide::Page,
    ) -> Result<Box<dyn Page>, DriverError> {
        Ok(Box::new(ChromiumPage::attach(page, &self.options).await?))
    }
}

#[async_trait]
impl Session for ChromiumSession {
    fn browser_type(&self) -> BrowserType {
        BrowserType::Chromium
    }

    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError> {
        let page = self.browser.new_page("about:blank").await?;
        self.adopted
            .lock()
            .await
            .insert(page.target_id().inner().clone());
        self.attach(page).await
    }

    async fn wait_for_new_page(
        &self,
        limit: Duration,
    ) -> Result<Box<dyn Page>, DriverError> {
        let adopt = async {
            let mut created = self.created.lock().await;
            loop {
                let target_id = created.recv().await.ok_or_else(|| {
                    DriverError::Protocol("browser has shut down".to_string())
                })?;
                if !self
                    .adopted
                    .lock()
                    .await
                    .insert(target_id.inner().clone())
                {
                    continue;
                }
                loop {
                    if let Some(page) = self.find_page(&target_id).await? {
                        return Ok::<_, DriverError>(page);
                    }
                    sleep(PAGE_POLL_INTERVAL).await;
                }
            }
        };
        let page = timeout(limit, adopt)
            .await
            .map_err(|_| DriverError::Timeout(limit))??;
        self.attach(page).await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        // Browser::close makes chromiumoxide log a websocket error; the
        // process is killed when the browser is dropped instead.
        for task in &self.tasks {
            task.abort();
        }
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

struct ChromiumPage {
    page: chromiumoxide::Page,
    console_task: JoinHandle<()>,
}

impl ChromiumPage {
    async fn attach(
        page: chromiumoxide::Page,
        options: &BrowserOptions,
    ) -> Result<Self, DriverError> {
        page.enable_runtime().await?;
        page.execute(
            emulation::SetDeviceMetricsOverrideParams::builder()
                .width(options.width)
                .height(options.height)
                .device_scale_factor(1)
                .mobile(false)
                .build()
                .map_err(DriverError::Protocol)?,
        )
        .await?;

        let mut console = page
            .event_listener::<runtime::EventConsoleApiCalled>()
            .await?;
        let console_task = tokio::spawn(async move {
            while let Some(call) = console.next().await {
                let arguments: Vec<String> = call
                    .args
                    .iter()
                    .map(|arg| match remote_object_to_json(arg) {
                        json::Value::String(text) => text,
                        other => other.to_string(),
                    })
                    .collect();
                log::info!(
                    target: "console",
                    "{:?}: {}",
                    call.r#type,
                    arguments.join(" ")
                );
            }
        });
        Ok(ChromiumPage { page, console_task })
    }

    async fn dispatch_key(
        &self,
        key: Key,
        event_type: input::DispatchKeyEventType,
    ) -> Result<(), DriverError> {
        self.page
            .execute(
                input::DispatchKeyEventParams::builder()
                    .r#type(event_type)
                    .native_virtual_key_code(key.code())
                    .windows_virtual_key_code(key.code())
                    .code(key.name())
                    .key(key.name())
                    .build()
                    .map_err(DriverError::Protocol)?,
            )
            .await?;
        Ok(())
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.console_task.abort();
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn goto(
        &self,
        url: &str,
        limit: Duration,
        wait_until: WaitUntil,
    ) -> Result<(), DriverError> {
        let started = Instant::now();
        let navigate = async {
            let navigated =
                self.page.execute(page::NavigateParams::new(url)).await?;
            match &navigated.result.error_text {
                Some(error_text) => {
                    Err(DriverError::Navigation(error_text.clone()))
                }
                None => Ok(()),
            }
        };
        timeout(limit, navigate)
            .await
            .map_err(|_| DriverError::Timeout(limit))??;

        let remaining = limit.saturating_sub(started.elapsed());
        match wait_until {
            WaitUntil::DomContentLoaded => {
                self.wait_for_function(
                    scripts::DOCUMENT_PARSED,
                    vec![],
                    remaining,
                )
                .await
            }
            WaitUntil::NetworkIdle => {
                self.wait_for_network_idle(remaining).await
            }
        }
    }

    async fn url(&self) -> Result<String, DriverError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn press_key(&self, key: Key) -> Result<(), DriverError> {
        self.dispatch_key(key, input::DispatchKeyEventType::RawKeyDown)
            .await?;
        self.dispatch_key(key, input::DispatchKeyEventType::KeyUp)
            .await
    }

    async fn evaluate_function(
        &self,
        function: &str,
        arguments: Vec<json::Value>,
    ) -> Result<json::Value, DriverError> {
        let expression = function_call_expression(function, &arguments)?;
        let returns = self
            .page
            .execute(
                runtime::EvaluateParams::builder()
                    .expression(expression)
                    .return_by_value(true)
                    .await_promise(true)
                    .build()
                    .map_err(DriverError::Protocol)?,
            )
            .await?
            .result;
        returned_value(returns.result, returns.exception_details)
    }

    async fn nth_element(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<Box<dyn Element>>, DriverError> {
        let elements =
            self.page.find_elements(format!("body {}", selector)).await?;
        Ok(elements.into_iter().nth(index).map(|element| {
            Box::new(ChromiumElement { element }) as Box<dyn Element>
        }))
    }
}

struct ChromiumElement {
    element: chromiumoxide::Element,
}

#[async_trait]
impl Element for ChromiumElement {
    async fn focus(&self) -> Result<(), DriverError> {
        self.element.focus().await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.element.type_str(text).await?;
        Ok(())
    }

    async fn check(&self) -> Result<(), DriverError> {
        let returns = self.element.call_js_fn(scripts::CHECK, false).await?;
        returned_value(returns.result, returns.exception_details)?;
        Ok(())
    }

    async fn select_option(
        &self,
        text: &str,
    ) -> Result<Option<String>, DriverError> {
        let function = format!(
            "function () {{ return ({}).call(this, {}); }}",
            scripts::SELECT_OPTION,
            json::to_string(text)?
        );
        let returns = self.element.call_js_fn(function, false).await?;
        let selected =
            returned_value(returns.result, returns.exception_details)?;
        Ok(selected.as_str().map(str::to_string))
    }

    async fn click(&self) -> Result<(), DriverError> {
        self.element.click().await?;
        Ok(())
    }

    async fn attribute(
        &self,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.element.attribute(name).await?)
    }
}

fn browser_options_to_config(
    browser_options: &BrowserOptions,
    user_data_directory: &Path,
) -> Result<BrowserConfig, DriverError> {
    let apply_sandbox =
        |builder: BrowserConfigBuilder| -> BrowserConfigBuilder {
            if browser_options.no_sandbox {
                builder.no_sandbox().args([
                    "--disable-setuid-sandbox",
                    "--disable-dev-shm-usage",
                ])
            } else {
                builder
            }
        };
    let crash_dumps_directory = user_data_directory.join("crash-dumps");
    apply_sandbox(BrowserConfig::builder())
        .headless_mode(if browser_options.headless {
            HeadlessMode::New
        } else {
            HeadlessMode::False
        })
        .window_size(
            browser_options.width as u32,
            browser_options.height as u32,
        )
        .user_data_dir(user_data_directory)
        .args([
            format!(
                "--crash-dumps-dir={}",
                crash_dumps_directory.to_string_lossy()
            ),
            "--no-crashpad".to_string(),
            "--disable-crash-reporter".to_string(),
        ])
        .build()
        .map_err(DriverError::Protocol)
}
