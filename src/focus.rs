//! Keyboard traversal of a page's focusable elements.
//!
//! Starting with one Tab press, every element that gains focus is marked in
//! the page with the key that reached it. A newly reached element is probed
//! with an arrow key, since composite widgets move focus between their items
//! with arrows rather than Tab. Revisiting an element means the current
//! key has nothing left to reach, so the traversal moves on to the next key
//! or, after Tab, stops. Focus leaving the document is answered with Tab,
//! and the traversal gives up after it leaves three times in a row.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::browser::evaluation::evaluate;
use crate::browser::keys::Key;
use crate::browser::{DriverError, Page, scripts};

pub const EXTERNAL_LIMIT: usize = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NavKey {
    Tab,
    ArrowRight,
    ArrowDown,
}

impl NavKey {
    pub fn name(&self) -> &'static str {
        match self {
            NavKey::Tab => "Tab",
            NavKey::ArrowRight => "ArrowRight",
            NavKey::ArrowDown => "ArrowDown",
        }
    }
}

impl From<NavKey> for Key {
    fn from(value: NavKey) -> Self {
        match value {
            NavKey::Tab => Key::Tab,
            NavKey::ArrowRight => Key::ArrowRight,
            NavKey::ArrowDown => Key::ArrowDown,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FocusStatus {
    External,
    Already,
    New,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Traversal {
    /// Elements marked as focused.
    pub marked: usize,
    /// Consecutive Tab presses answering focus outside the document when the
    /// traversal ended.
    pub external_tabs: usize,
}

/// The key to press after `last`, given whether it reached an element that
/// was already marked. `None` ends the traversal.
pub fn next_key(last: NavKey, already: bool) -> Option<NavKey> {
    match (last, already) {
        (NavKey::Tab, false) => Some(NavKey::ArrowRight),
        (NavKey::Tab, true) => None,
        (NavKey::ArrowRight, _) => Some(NavKey::ArrowDown),
        (NavKey::ArrowDown, false) => Some(NavKey::ArrowDown),
        (NavKey::ArrowDown, true) => Some(NavKey::Tab),
    }
}

pub async fn traverse(page: &dyn Page) -> Result<Traversal, DriverError> {
    let mut traversal = Traversal::default();
    let mut last = NavKey::Tab;
    page.press_key(last.into()).await?;
    loop {
        let status: FocusStatus =
            evaluate(page, scripts::MARK_FOCUS, vec![json!(last.name())])
                .await?;
        let next = match status {
            FocusStatus::External => {
                traversal.external_tabs += 1;
                page.press_key(Key::Tab).await?;
                last = NavKey::Tab;
                if traversal.external_tabs >= EXTERNAL_LIMIT {
                    break;
                }
                continue;
            }
            FocusStatus::New => {
                traversal.marked += 1;
                traversal.external_tabs = 0;
                next_key(last, false)
            }
            FocusStatus::Already => {
                traversal.external_tabs = 0;
                next_key(last, true)
            }
        };
        match next {
            Some(key) => {
                page.press_key(key.into()).await?;
                last = key;
            }
            None => break,
        }
    }
    log::debug!("focus traversal: {:?}", traversal);
    Ok(traversal)
}
