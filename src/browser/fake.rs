//! An in-memory browser for exercising the interpreter without Chromium.
//!
//! Pages answer `evaluate_function` by recognizing which script they were
//! given and computing its result from a [`FakeDocument`]. Keyboard focus
//! follows a small model: Tab visits tabbable elements in document order
//! and leaves the document after the last one, arrow keys move to the next
//! element of the same group.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{self as json, json};
use tokio::time::sleep;

use crate::browser::keys::Key;
use crate::browser::{
    BrowserType, Driver, DriverError, Element, Page, Session, WaitUntil,
    scripts,
};

const MARK_NAMES: [&str; 3] = ["Tab", "ArrowRight", "ArrowDown"];

#[derive(Clone, Debug, Default)]
pub struct FakeElement {
    pub selector: String,
    pub tag: String,
    pub text: String,
    pub aria_label: Option<String>,
    pub labels: Option<Vec<String>>,
    pub placeholder: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub options: Vec<String>,
    pub role: Option<String>,
    pub background_image: Option<String>,
    pub visible: bool,
    pub tabbable: bool,
    pub group: Option<usize>,
}

impl FakeElement {
    pub fn new(selector: &str) -> Self {
        let tag = selector.split('[').next().unwrap_or(selector);
        FakeElement {
            selector: selector.to_string(),
            tag: tag.to_string(),
            visible: true,
            ..FakeElement::default()
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn aria_label(mut self, label: &str) -> Self {
        self.aria_label = Some(label.to_string());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.labels.get_or_insert_with(Vec::new).push(label.to_string());
        self
    }

    pub fn placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn background_image(mut self, url: &str) -> Self {
        self.background_image = Some(url.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn tabbable(mut self) -> Self {
        self.tabbable = true;
        self
    }

    pub fn in_group(mut self, group: usize) -> Self {
        self.group = Some(group);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct FakeDocument {
    pub url: String,
    pub title: String,
    pub body_text: String,
    pub elements: Vec<FakeElement>,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub document: FakeDocument,
    pub unreachable: Vec<String>,
    pub active: Option<usize>,
    pub marks: Vec<Option<String>>,
    pub keys: Vec<Key>,
    pub events: Vec<String>,
}

impl FakeState {
    fn matching(&self, selector: &str) -> Vec<usize> {
        self.document
            .elements
            .iter()
            .enumerate()
            .filter(|(_, element)| element.selector == selector)
            .map(|(index, _)| index)
            .collect()
    }

    fn press(&mut self, key: Key) {
        self.keys.push(key);
        match key {
            Key::Tab => {
                let start = self.active.map_or(0, |active| active + 1);
                self.active = (start..self.document.elements.len())
                    .find(|&index| self.document.elements[index].tabbable);
            }
            Key::ArrowRight | Key::ArrowDown => {
                let Some(active) = self.active else {
                    return;
                };
                let Some(group) = self.document.elements[active].group else {
                    return;
                };
                if let Some(next) = (active + 1..self.document.elements.len())
                    .find(|&index| {
                        self.document.elements[index].group == Some(group)
                    })
                {
                    self.active = Some(next);
                }
            }
            Key::Escape => {}
        }
    }

    fn mark_focus(&mut self, key: &str) -> &'static str {
        let Some(active) = self.active else {
            return "external";
        };
        if self.marks.len() < self.document.elements.len() {
            self.marks.resize(self.document.elements.len(), None);
        }
        if self.marks[active].is_some() {
            return "already";
        }
        self.marks[active] = Some(key.to_string());
        "new"
    }

    fn wait_for(&self, target: &str, text: &str) -> bool {
        match target {
            "url" => self.document.url.contains(text),
            "title" => self.document.title.contains(text),
            "body" => self.document.body_text.contains(text),
            _ => false,
        }
    }

    fn evaluate(
        &mut self,
        function: &str,
        arguments: &[json::Value],
    ) -> Result<json::Value, DriverError> {
        let argument = |index: usize| {
            arguments
                .get(index)
                .and_then(json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let elements = &self.document.elements;
        let value = match function {
            scripts::CANDIDATES => json::Value::Array(
                self.matching(&argument(0))
                    .into_iter()
                    .map(|index| {
                        let element = &elements[index];
                        json!({
                            "text": element.text,
                            "ariaLabel": element.aria_label,
                            "labels": element.labels,
                            "labelledBy": null,
                            "placeholder": element.placeholder,
                        })
                    })
                    .collect(),
            ),
            scripts::MARK_FOCUS => json!(self.mark_focus(&argument(0))),
            scripts::FOCUS_MARKS => json::Value::Array(
                self.marks
                    .iter()
                    .enumerate()
                    .filter_map(|(index, mark)| {
                        let element = &elements[index];
                        mark.as_ref().map(|key| {
                            json!({
                                "tag": element.tag,
                                "key": key,
                                "text": element.text,
                            })
                        })
                    })
                    .collect(),
            ),
            scripts::REVEAL => {
                let revealed = elements.iter().filter(|e| !e.visible).count();
                for element in &mut self.document.elements {
                    element.visible = true;
                }
                json!(revealed)
            }
            scripts::WAIT_FOR => {
                json!(self.wait_for(&argument(0), &argument(1)))
            }
            scripts::LOAD_PROBE => json!({"complete": true, "resources": 0}),
            scripts::DOCUMENT_PARSED => json!(true),
            scripts::VISIBLE_COUNT => {
                json!(elements.iter().filter(|e| e.visible).count())
            }
            scripts::BODY_TEXT => json!(self.document.body_text),
            scripts::ROLES => json::Value::Array(
                elements
                    .iter()
                    .filter_map(|element| {
                        element.role.as_ref().map(|role| (&element.tag, role))
                    })
                    .enumerate()
                    .map(|(index, (tag, role))| {
                        json!({"index": index, "tag": tag, "role": role})
                    })
                    .collect(),
            ),
            scripts::BACKGROUND_IMAGES => json!(
                elements
                    .iter()
                    .filter_map(|e| e.background_image.clone())
                    .collect::<Vec<_>>()
            ),
            other => {
                return Err(DriverError::Evaluation(format!(
                    "fake page cannot evaluate {}",
                    other.lines().next().unwrap_or_default()
                )));
            }
        };
        Ok(value)
    }
}

pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new(document: FakeDocument) -> Self {
        FakePage::with_state(Arc::new(Mutex::new(FakeState {
            document,
            ..FakeState::default()
        })))
    }

    fn with_state(state: Arc<Mutex<FakeState>>) -> Self {
        FakePage { state }
    }

    pub fn keys(&self) -> Vec<Key> {
        self.state.lock().unwrap().keys.clone()
    }

    pub fn marks(&self) -> Vec<Option<&'static str>> {
        let state = self.state.lock().unwrap();
        (0..state.document.elements.len())
            .map(|index| {
                let mark = state.marks.get(index).cloned().flatten();
                mark.and_then(|mark| {
                    MARK_NAMES.into_iter().find(|name| *name == mark)
                })
            })
            .collect()
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(
        &self,
        url: &str,
        _limit: Duration,
        _wait_until: WaitUntil,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable.iter().any(|host| url.contains(host.as_str())) {
            return Err(DriverError::Navigation(
                "net::ERR_NAME_NOT_RESOLVED".to_string(),
            ));
        }
        state.events.push(format!("goto {}", url));
        state.document.url = url.to_string();
        state.active = None;
        Ok(())
    }

    async fn url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().unwrap().document.url.clone())
    }

    async fn press_key(&self, key: Key) -> Result<(), DriverError> {
        self.state.lock().unwrap().press(key);
        Ok(())
    }

    async fn evaluate_function(
        &self,
        function: &str,
        arguments: Vec<json::Value>,
    ) -> Result<json::Value, DriverError> {
        self.state.lock().unwrap().evaluate(function, &arguments)
    }

    async fn nth_element(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<Box<dyn Element>>, DriverError> {
        let matching = self.state.lock().unwrap().matching(selector);
        Ok(matching.get(index).map(|&index| {
            Box::new(FakeElementHandle {
                state: self.state.clone(),
                index,
            }) as Box<dyn Element>
        }))
    }
}

struct FakeElementHandle {
    state: Arc<Mutex<FakeState>>,
    index: usize,
}

impl FakeElementHandle {
    fn record(&self, event: String) {
        self.state.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl Element for FakeElementHandle {
    async fn focus(&self) -> Result<(), DriverError> {
        self.state.lock().unwrap().active = Some(self.index);
        self.record(format!("focus {}", self.index));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        self.record(format!("type {} {}", self.index, text));
        Ok(())
    }

    async fn check(&self) -> Result<(), DriverError> {
        self.record(format!("check {}", self.index));
        Ok(())
    }

    async fn select_option(
        &self,
        text: &str,
    ) -> Result<Option<String>, DriverError> {
        let found = self.state.lock().unwrap().document.elements[self.index]
            .options
            .iter()
            .any(|option| option == text);
        if !found {
            return Ok(None);
        }
        self.record(format!("select {} {}", self.index, text));
        Ok(Some(text.to_string()))
    }

    async fn click(&self) -> Result<(), DriverError> {
        self.record(format!("click {}", self.index));
        Ok(())
    }

    async fn attribute(
        &self,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let state = self.state.lock().unwrap();
        Ok(state.document.elements[self.index]
            .attributes
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(_, value)| value.clone()))
    }
}

/// Every launch serves the same `site` document. The documents in `popups`
/// appear to `wait_for_new_page` in order, once per session.
#[derive(Clone, Default)]
pub struct FakeDriver {
    pub site: FakeDocument,
    pub unreachable: Vec<String>,
    pub popups: Vec<FakeDocument>,
    pub unsupported: Vec<BrowserType>,
    pages: Arc<Mutex<Vec<Arc<Mutex<FakeState>>>>>,
    launches: Arc<Mutex<Vec<BrowserType>>>,
}

impl FakeDriver {
    pub fn new(site: FakeDocument) -> Self {
        FakeDriver {
            site,
            ..FakeDriver::default()
        }
    }

    pub fn launches(&self) -> Vec<BrowserType> {
        self.launches.lock().unwrap().clone()
    }

    /// Events recorded by every page opened so far, in opening order.
    pub fn events(&self) -> Vec<Vec<String>> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .map(|page| page.lock().unwrap().events.clone())
            .collect()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn launch(
        &self,
        browser_type: BrowserType,
    ) -> Result<Box<dyn Session>, DriverError> {
        if self.unsupported.contains(&browser_type) {
            return Err(DriverError::Unsupported(format!(
                "{} is not installed",
                browser_type
            )));
        }
        self.launches.lock().unwrap().push(browser_type);
        Ok(Box::new(FakeSession {
            browser_type,
            driver: self.clone(),
            popups: Mutex::new(self.popups.iter().cloned().collect()),
        }))
    }
}

struct FakeSession {
    browser_type: BrowserType,
    driver: FakeDriver,
    popups: Mutex<VecDeque<FakeDocument>>,
}

impl FakeSession {
    fn open(&self, document: FakeDocument) -> Box<dyn Page> {
        let state = Arc::new(Mutex::new(FakeState {
            document,
            unreachable: self.driver.unreachable.clone(),
            ..FakeState::default()
        }));
        self.driver.pages.lock().unwrap().push(state.clone());
        Box::new(FakePage::with_state(state))
    }
}

#[async_trait]
impl Session for FakeSession {
    fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError> {
        Ok(self.open(FakeDocument {
            url: "about:blank".to_string(),
            ..self.driver.site.clone()
        }))
    }

    async fn wait_for_new_page(
        &self,
        limit: Duration,
    ) -> Result<Box<dyn Page>, DriverError> {
        let popup = self.popups.lock().unwrap().pop_front();
        match popup {
            Some(document) => Ok(self.open(document)),
            None => {
                sleep(limit).await;
                Err(DriverError::Timeout(limit))
            }
        }
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
