//! Function expressions evaluated inside pages.
//!
//! Each file holds a single JavaScript function expression (no trailing
//! semicolon) so it can be applied to JSON arguments as `(f)(a, b)`. The
//! `check` and `select_option` functions are called on an element, with the
//! element bound to `this`.

pub const CANDIDATES: &str = include_str!("scripts/candidates.js");
pub const MARK_FOCUS: &str = include_str!("scripts/mark_focus.js");
pub const FOCUS_MARKS: &str = include_str!("scripts/focus_marks.js");
pub const REVEAL: &str = include_str!("scripts/reveal.js");
pub const WAIT_FOR: &str = include_str!("scripts/wait_for.js");
pub const LOAD_PROBE: &str = include_str!("scripts/load_probe.js");
pub const DOCUMENT_PARSED: &str = include_str!("scripts/document_parsed.js");
pub const VISIBLE_COUNT: &str = include_str!("scripts/visible_count.js");
pub const BODY_TEXT: &str = include_str!("scripts/body_text.js");
pub const ROLES: &str = include_str!("scripts/roles.js");
pub const BACKGROUND_IMAGES: &str =
    include_str!("scripts/background_images.js");
pub const CHECK: &str = include_str!("scripts/check.js");
pub const SELECT_OPTION: &str = include_str!("scripts/select_option.js");
