use std::fmt::Display;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json as json;
use tokio::time::{Instant, sleep, timeout};

use crate::browser::keys::Key;

pub mod chromium;
pub mod evaluation;
#[cfg(test)]
pub(crate) mod fake;
pub mod keys;
pub mod scripts;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "chromium" => Some(BrowserType::Chromium),
            "firefox" => Some(BrowserType::Firefox),
            "webkit" => Some(BrowserType::Webkit),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BrowserType::Chromium => "chromium",
            BrowserType::Firefox => "firefox",
            BrowserType::Webkit => "webkit",
        }
    }

    /// The product name shown to readers of exhibits.
    pub fn display_name(&self) -> &'static str {
        match self {
            BrowserType::Chromium => "Chrome",
            BrowserType::Firefox => "Firefox",
            BrowserType::Webkit => "Safari",
        }
    }
}

impl Display for BrowserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How long `goto` keeps waiting once the navigation has committed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum WaitUntil {
    #[default]
    DomContentLoaded,
    NetworkIdle,
}

#[derive(Debug)]
pub enum DriverError {
    Timeout(Duration),
    Navigation(String),
    Unsupported(String),
    Protocol(String),
    Evaluation(String),
    IO(io::Error),
}

impl Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Timeout(duration) => {
                write!(f, "timed out after {}s", duration.as_secs_f64())
            }
            DriverError::Navigation(message) => message.fmt(f),
            DriverError::Unsupported(message) => message.fmt(f),
            DriverError::Protocol(message) => message.fmt(f),
            DriverError::Evaluation(message) => {
                write!(f, "evaluation failed: {}", message)
            }
            DriverError::IO(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for DriverError {}

impl DriverError {
    /// Errors a page reports while a navigation replaces its execution
    /// context. Polling waits retry after them.
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::Evaluation(_) | DriverError::Protocol(_))
    }
}

impl From<json::Error> for DriverError {
    fn from(value: json::Error) -> Self {
        DriverError::Evaluation(value.to_string())
    }
}

impl From<io::Error> for DriverError {
    fn from(value: io::Error) -> Self {
        DriverError::IO(value)
    }
}

#[derive(Debug, Deserialize)]
struct LoadProbe {
    complete: bool,
    resources: u64,
}

#[async_trait]
pub trait Driver: Send + Sync {
    async fn launch(
        &self,
        browser_type: BrowserType,
    ) -> Result<Box<dyn Session>, DriverError>;
}

/// A launched browser with one context, owning every page opened in it.
#[async_trait]
pub trait Session: Send + Sync {
    fn browser_type(&self) -> BrowserType;

    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError>;

    /// Waits for a page this session has not handed out yet, e.g. one opened
    /// by a `target="_blank"` link.
    async fn wait_for_new_page(
        &self,
        limit: Duration,
    ) -> Result<Box<dyn Page>, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(
        &self,
        url: &str,
        limit: Duration,
        wait_until: WaitUntil,
    ) -> Result<(), DriverError>;

    async fn url(&self) -> Result<String, DriverError>;

    async fn press_key(&self, key: Key) -> Result<(), DriverError>;

    /// Calls the function expression `function` in the page with JSON
    /// `arguments` and returns its (awaited) result by value.
    async fn evaluate_function(
        &self,
        function: &str,
        arguments: Vec<json::Value>,
    ) -> Result<json::Value, DriverError>;

    /// The `index`th element under `body` matching `selector`, in document
    /// order.
    async fn nth_element(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<Box<dyn Element>>, DriverError>;

    async fn wait_for_function(
        &self,
        function: &str,
        arguments: Vec<json::Value>,
        limit: Duration,
    ) -> Result<(), DriverError> {
        let poll = async {
            loop {
                match self
                    .evaluate_function(function, arguments.clone())
                    .await
                {
                    Ok(json::Value::Bool(true)) => {
                        return Ok::<(), DriverError>(());
                    }
                    Ok(_) => {}
                    Err(error) if error.is_transient() => {
                        log::debug!("waiting through: {}", error);
                    }
                    Err(error) => return Err(error),
                }
                sleep(POLL_INTERVAL).await;
            }
        };
        timeout(limit, poll)
            .await
            .map_err(|_| DriverError::Timeout(limit))?
    }

    /// Waits until the document is complete and no resource has been
    /// requested for a while.
    async fn wait_for_network_idle(
        &self,
        limit: Duration,
    ) -> Result<(), DriverError> {
        let poll = async {
            let mut stable: Option<(u64, Instant)> = None;
            loop {
                let probe = self
                    .evaluate_function(scripts::LOAD_PROBE, vec![])
                    .await
                    .and_then(|value| {
                        json::from_value::<LoadProbe>(value)
                            .map_err(DriverError::from)
                    });
                let probe = match probe {
                    Ok(probe) => probe,
                    Err(error) if error.is_transient() => {
                        log::debug!("waiting through: {}", error);
                        stable = None;
                        sleep(POLL_INTERVAL).await;
                        continue;
                    }
                    Err(error) => return Err(error),
                };
                match stable {
                    Some((resources, since))
                        if probe.complete && resources == probe.resources =>
                    {
                        if since.elapsed() >= IDLE_WINDOW {
                            return Ok::<(), DriverError>(());
                        }
                    }
                    _ => {
                        stable = probe
                            .complete
                            .then(|| (probe.resources, Instant::now()));
                    }
                }
                sleep(POLL_INTERVAL).await;
            }
        };
        timeout(limit, poll)
            .await
            .map_err(|_| DriverError::Timeout(limit))?
    }
}

#[async_trait]
pub trait Element: Send + Sync {
    async fn focus(&self) -> Result<(), DriverError>;

    async fn type_text(&self, text: &str) -> Result<(), DriverError>;

    async fn check(&self) -> Result<(), DriverError>;

    /// Selects the option whose label or value equals `text` and returns
    /// the label of the option now selected, if one matched.
    async fn select_option(
        &self,
        text: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn click(&self) -> Result<(), DriverError>;

    async fn attribute(&self, name: &str)
    -> Result<Option<String>, DriverError>;
}
