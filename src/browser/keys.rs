use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Key {
    Tab,
    Escape,
    ArrowRight,
    ArrowDown,
}

impl Key {
    /// The DOM `key` and `code` value.
    pub fn name(&self) -> &'static str {
        match self {
            Key::Tab => "Tab",
            Key::Escape => "Escape",
            Key::ArrowRight => "ArrowRight",
            Key::ArrowDown => "ArrowDown",
        }
    }

    /// Windows virtual key code.
    pub fn code(&self) -> i64 {
        match self {
            Key::Tab => 9,
            Key::Escape => 27,
            Key::ArrowRight => 39,
            Key::ArrowDown => 40,
        }
    }
}
