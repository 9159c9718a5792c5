//! Field rules for every act kind.
//!
//! An act is valid when it has a known `type` and every field its kind
//! declares is present (if required), of the declared primitive type, and
//! satisfies the declared subtype. A `test` act also carries the extra fields
//! of the test it names.

use serde_json as json;

use crate::act::{Act, MoveKind, Waitable};
use crate::audit::Audits;
use crate::browser::BrowserType;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Primitive {
    String,
    List,
    Boolean,
    Number,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Subtype {
    /// A string or list with at least one element.
    NonEmpty,
    AbsoluteUrl,
    BrowserType,
    FocusableTag,
    TestName,
    Waitable,
    /// A list whose elements are all strings.
    Strings,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub required: bool,
    pub primitive: Primitive,
    pub subtype: Option<Subtype>,
}

impl FieldSpec {
    pub const fn required(primitive: Primitive) -> Self {
        FieldSpec {
            required: true,
            primitive,
            subtype: None,
        }
    }

    pub const fn optional(primitive: Primitive) -> Self {
        FieldSpec {
            required: false,
            primitive,
            subtype: None,
        }
    }

    pub const fn with(self, subtype: Subtype) -> Self {
        FieldSpec {
            subtype: Some(subtype),
            ..self
        }
    }
}

pub type Fields = &'static [(&'static str, FieldSpec)];

const FOCUSABLE_TAGS: [&str; 5] = ["a", "button", "input", "select", "option"];

const URL_PREFIXES: [&str; 3] = ["http://", "https://", "file://"];

const LAUNCH: Fields = &[
    (
        "which",
        FieldSpec::required(Primitive::String).with(Subtype::BrowserType),
    ),
    (
        "what",
        FieldSpec::optional(Primitive::String).with(Subtype::NonEmpty),
    ),
];
const URL: Fields = &[(
    "which",
    FieldSpec::required(Primitive::String).with(Subtype::AbsoluteUrl),
)];
const WAIT: Fields = &[
    (
        "which",
        FieldSpec::required(Primitive::String).with(Subtype::NonEmpty),
    ),
    (
        "what",
        FieldSpec::required(Primitive::String).with(Subtype::Waitable),
    ),
];
const DESCRIBED: Fields = &[("what", FieldSpec::optional(Primitive::String))];
const ENTRY: Fields = &[
    (
        "which",
        FieldSpec::required(Primitive::String).with(Subtype::NonEmpty),
    ),
    ("what", FieldSpec::required(Primitive::String)),
];
const PRESS: Fields = &[
    (
        "which",
        FieldSpec::required(Primitive::String).with(Subtype::NonEmpty),
    ),
    (
        "what",
        FieldSpec::optional(Primitive::String).with(Subtype::NonEmpty),
    ),
];
const FOCUS: Fields = &[
    (
        "which",
        FieldSpec::required(Primitive::String).with(Subtype::NonEmpty),
    ),
    (
        "what",
        FieldSpec::required(Primitive::String).with(Subtype::FocusableTag),
    ),
];
const TEST: Fields = &[
    (
        "which",
        FieldSpec::required(Primitive::String).with(Subtype::TestName),
    ),
    ("what", FieldSpec::optional(Primitive::String)),
];
const SCORE: Fields = &[(
    "which",
    FieldSpec::required(Primitive::String).with(Subtype::NonEmpty),
)];

pub fn command_fields(kind: &str) -> Option<Fields> {
    let fields = match kind {
        "launch" => LAUNCH,
        "url" => URL,
        "wait" => WAIT,
        "page" | "reveal" => DESCRIBED,
        "test" => TEST,
        "score" => SCORE,
        kind => match MoveKind::from_name(kind)? {
            MoveKind::Text | MoveKind::Select => ENTRY,
            MoveKind::Focus => FOCUS,
            MoveKind::Radio
            | MoveKind::Checkbox
            | MoveKind::Button
            | MoveKind::Link => PRESS,
        },
    };
    Some(fields)
}

pub fn is_valid(act: &Act, audits: &Audits) -> bool {
    let Some(kind) = act.kind() else {
        return false;
    };
    let Some(base) = command_fields(kind) else {
        return false;
    };
    let extra = if kind == "test" {
        match act.which().and_then(|name| audits.get(name)) {
            Some(audit) => audit.fields(),
            None => return false,
        }
    } else {
        &[]
    };
    merge(base, extra)
        .into_iter()
        .all(|(name, spec)| is_valid_field(act.field(name), &spec, audits))
}

/// Base fields followed by extra fields, an extra field replacing a base
/// field of the same name.
fn merge(base: Fields, extra: Fields) -> Vec<(&'static str, FieldSpec)> {
    let mut fields: Vec<(&'static str, FieldSpec)> = base
        .iter()
        .filter(|(name, _)| !extra.iter().any(|(other, _)| other == name))
        .copied()
        .collect();
    fields.extend_from_slice(extra);
    fields
}

fn is_valid_field(
    value: Option<&json::Value>,
    spec: &FieldSpec,
    audits: &Audits,
) -> bool {
    match value {
        None => !spec.required,
        Some(value) => {
            has_primitive(value, spec.primitive)
                && spec
                    .subtype
                    .is_none_or(|subtype| has_subtype(value, subtype, audits))
        }
    }
}

fn has_primitive(value: &json::Value, primitive: Primitive) -> bool {
    match primitive {
        Primitive::String => value.is_string(),
        Primitive::List => value.is_array(),
        Primitive::Boolean => value.is_boolean(),
        Primitive::Number => value.is_number(),
    }
}

fn has_subtype(value: &json::Value, subtype: Subtype, audits: &Audits) -> bool {
    let text = value.as_str();
    match subtype {
        Subtype::NonEmpty => match value {
            json::Value::String(text) => !text.is_empty(),
            json::Value::Array(items) => !items.is_empty(),
            _ => false,
        },
        Subtype::AbsoluteUrl => text.is_some_and(is_absolute_url),
        Subtype::BrowserType => {
            text.and_then(BrowserType::from_name).is_some()
        }
        Subtype::FocusableTag => {
            text.is_some_and(|tag| FOCUSABLE_TAGS.contains(&tag))
        }
        Subtype::TestName => {
            text.is_some_and(|name| audits.get(name).is_some())
        }
        Subtype::Waitable => text.and_then(Waitable::from_name).is_some(),
        Subtype::Strings => value
            .as_array()
            .is_some_and(|items| items.iter().all(json::Value::is_string)),
    }
}

/// `http://`, `https://` or `file://` followed by at least one character,
/// with no spaces anywhere.
pub fn is_absolute_url(text: &str) -> bool {
    !text.contains(' ')
        && URL_PREFIXES.iter().any(|prefix| {
            text.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty())
        })
}
