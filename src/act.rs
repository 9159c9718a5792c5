use serde::{Deserialize, Serialize};
use serde_json as json;

use crate::browser::BrowserType;

/// One script instruction. Fields beyond `type`, `which` and `what` belong
/// to the instruction kind (e.g. `withItems` on a `focAll` test), and the
/// interpreter writes `result`, `url`, `what` and `exhibits` back into it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Act(json::Map<String, json::Value>);

impl Act {
    pub fn kind(&self) -> Option<&str> {
        self.string("type")
    }

    pub fn which(&self) -> Option<&str> {
        self.string("which")
    }

    pub fn what(&self) -> Option<&str> {
        self.string("what")
    }

    pub fn result(&self) -> Option<&json::Value> {
        self.field("result")
    }

    /// A field's value, treating JSON `null` as absent.
    pub fn field(&self, name: &str) -> Option<&json::Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    pub fn set(&mut self, name: &str, value: json::Value) {
        self.0.insert(name.to_string(), value);
    }

    pub fn set_result(&mut self, value: json::Value) {
        self.set("result", value);
    }

    fn string(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(json::Value::as_str)
    }
}

impl From<json::Map<String, json::Value>> for Act {
    fn from(value: json::Map<String, json::Value>) -> Self {
        Act(value)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Waitable {
    Url,
    Title,
    Body,
}

impl Waitable {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "url" => Some(Waitable::Url),
            "title" => Some(Waitable::Title),
            "body" => Some(Waitable::Body),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Waitable::Url => "url",
            Waitable::Title => "title",
            Waitable::Body => "body",
        }
    }
}

/// Acts that find an element by its text and then operate on it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MoveKind {
    Text,
    Radio,
    Checkbox,
    Select,
    Button,
    Link,
    Focus,
}

impl MoveKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(MoveKind::Text),
            "radio" => Some(MoveKind::Radio),
            "checkbox" => Some(MoveKind::Checkbox),
            "select" => Some(MoveKind::Select),
            "button" => Some(MoveKind::Button),
            "link" => Some(MoveKind::Link),
            "focus" => Some(MoveKind::Focus),
            _ => None,
        }
    }

    /// The CSS selector for candidate elements. A `focus` act names its
    /// element tag in `what`.
    pub fn selector(&self, what: Option<&str>) -> Option<String> {
        let selector = match self {
            MoveKind::Text => "input[type=text]",
            MoveKind::Radio => "input[type=radio]",
            MoveKind::Checkbox => "input[type=checkbox]",
            MoveKind::Select => "select",
            MoveKind::Button => "button",
            MoveKind::Link => "a",
            MoveKind::Focus => what?,
        };
        Some(selector.to_string())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Launch {
        browser: BrowserType,
    },
    Url {
        url: String,
    },
    Wait {
        target: Waitable,
        text: String,
    },
    Page,
    Reveal,
    Test {
        name: String,
    },
    Move {
        kind: MoveKind,
        which: String,
        what: Option<String>,
    },
    Score {
        name: String,
    },
}

impl Command {
    /// Reads the command out of an act. Only meaningful for acts that have
    /// passed validation; returns `None` for anything it cannot interpret.
    pub fn from_act(act: &Act) -> Option<Command> {
        let which = act.which();
        let command = match act.kind()? {
            "launch" => Command::Launch {
                browser: BrowserType::from_name(which?)?,
            },
            "url" => Command::Url {
                url: which?.to_string(),
            },
            "wait" => Command::Wait {
                target: Waitable::from_name(act.what()?)?,
                text: which?.to_string(),
            },
            "page" => Command::Page,
            "reveal" => Command::Reveal,
            "test" => Command::Test {
                name: which?.to_string(),
            },
            "score" => Command::Score {
                name: which?.to_string(),
            },
            kind => Command::Move {
                kind: MoveKind::from_name(kind)?,
                which: which?.to_string(),
                what: act.what().map(str::to_string),
            },
        };
        Some(command)
    }
}
