//! Weighted deficit scoring.
//!
//! Every test result is turned into a deficit (higher is worse). Rules that
//! several packages report for the same fault are discounted so a fault is
//! not counted three times. A package that did not report is estimated from
//! the others plus a penalty.

use anyhow::Result;
use serde_json::{self as json, json};

use crate::act::Act;
use crate::score::Scorer;

const PACKAGES: [&str; 3] = ["axe", "ibm", "wave"];
const MISSING_PACKAGE_PENALTY: i64 = 100;
const MISSING_FOCUS_OPERABILITY: i64 = 150;

const SCORED_TESTS: [&str; 15] = [
    "axe",
    "ibm",
    "wave",
    "bulk",
    "embAc",
    "focInd",
    "focOl",
    "focOp",
    "hover",
    "labClash",
    "linkUl",
    "motion",
    "radioSet",
    "role",
    "styleDiff",
];

const AXE_DISCOUNTS: &[(&str, f64)] = &[
    ("aria-allowed-role", 1.0),
    ("aria-roles", 2.0),
    ("color-contrast", 2.0),
    ("image-redundant-alt", 1.0),
    ("label", 3.0),
    ("link-name", 2.0),
    ("region", 1.0),
];

const IBM_DISCOUNTS: &[(&str, f64)] = &[
    ("aria_semantics_role", 2.0),
    ("IBMA_Color_Contrast_WCAG2AA", 2.0),
    ("Rpt_Aria_OrphanedContent_Native_Host_Sematics", 2.0),
    ("Rpt_Aria_ValidIdRef", 2.0),
    ("Rpt_Aria_ValidRole", 2.0),
    ("WCAG20_A_HasText", 2.0),
    ("WCAG20_Fieldset_HasLegend", 3.0),
    ("WCAG20_Input_ExplicitLabel", 2.0),
    ("WCAG20_Input_RadioChkInFieldSet", 3.0),
];

const WAVE_DISCOUNTS: &[(&str, f64)] = &[
    ("alt_redundant", 1.0),
    ("aria_reference_broken", 2.0),
    ("contrast", 1.0),
    ("fieldset_missing", 1.0),
    ("label_orphaned", 1.0),
    ("legend_missing", 1.0),
    ("link_empty", 2.0),
    ("select_missing_label", 1.0),
];

/// A deficit that is a weighted sum of counts found under `facts` in a
/// test's result.
struct Linear {
    test: &'static str,
    facts: &'static [&'static str],
    terms: &'static [(&'static [&'static str], f64)],
    fallback: i64,
}

const LINEAR: &[Linear] = &[
    Linear {
        test: "embAc",
        facts: &["totals"],
        terms: &[
            (&["links"], 4.0),
            (&["buttons"], 4.0),
            (&["inputs"], 4.0),
            (&["selects"], 4.0),
        ],
        fallback: 100,
    },
    Linear {
        test: "focInd",
        facts: &["totals", "types", "indicatorMissing"],
        terms: &[(&["total"], 5.0)],
        fallback: 150,
    },
    Linear {
        test: "focOl",
        facts: &["totals", "types", "outlineMissing"],
        terms: &[(&["total"], 3.0)],
        fallback: 100,
    },
    Linear {
        test: "focOp",
        facts: &["totals"],
        terms: &[
            (&["operableNotFocusable", "total"], 4.0),
            (&["focusableNotOperable", "total"], 1.0),
        ],
        fallback: 150,
    },
    Linear {
        test: "hover",
        facts: &["totals"],
        terms: &[(&["triggers"], 4.0), (&["targets"], 2.0)],
        fallback: 150,
    },
    Linear {
        test: "labClash",
        facts: &["totals"],
        terms: &[(&["mislabeled"], 2.0), (&["unlabeled"], 2.0)],
        fallback: 100,
    },
    Linear {
        test: "linkUl",
        facts: &["totals", "inline"],
        terms: &[(&["total"], 3.0), (&["underlined"], -3.0)],
        fallback: 150,
    },
    Linear {
        test: "radioSet",
        facts: &["totals"],
        terms: &[(&["total"], 2.0), (&["inSet"], -2.0)],
        fallback: 100,
    },
    Linear {
        test: "role",
        facts: &[],
        terms: &[(&["badRoleElements"], 2.0)],
        fallback: 100,
    },
];

pub struct Weighted;

impl Scorer for Weighted {
    fn score(&self, acts: &[Act]) -> Result<json::Value> {
        let mut deficits = Deficits::default();
        for act in acts.iter().filter(|act| act.kind() == Some("test")) {
            if let Some(which) = act.which() {
                deficits.add_test(which, act.result());
            }
        }
        deficits.estimate_packages();
        if deficits.get("focOp").is_none() {
            deficits.set("focOp", MISSING_FOCUS_OPERABILITY);
        }
        Ok(deficits.into_json())
    }
}

#[derive(Debug)]
struct Deficits {
    total: i64,
    by_test: Vec<(&'static str, Option<i64>)>,
}

impl Default for Deficits {
    fn default() -> Self {
        Deficits {
            total: 0,
            by_test: SCORED_TESTS.iter().map(|test| (*test, None)).collect(),
        }
    }
}

impl Deficits {
    fn get(&self, test: &str) -> Option<i64> {
        self.by_test
            .iter()
            .find(|(name, _)| *name == test)
            .and_then(|(_, deficit)| *deficit)
    }

    /// Records a test's deficit. A test run twice counts twice in the total
    /// but only its last deficit is listed.
    fn set(&mut self, test: &str, deficit: i64) {
        if let Some(entry) =
            self.by_test.iter_mut().find(|(name, _)| *name == test)
        {
            entry.1 = Some(deficit);
            self.total += deficit;
        }
    }

    fn add_test(&mut self, test: &str, result: Option<&json::Value>) {
        let null = json::Value::Null;
        let result = result.unwrap_or(&null);
        let deficit = match test {
            "axe" => axe(result),
            "ibm" => ibm(result),
            "wave" => wave(result),
            "bulk" => Some(bulk(result)),
            "motion" => Some(motion(result)),
            "styleDiff" => Some(style_diff(result)),
            test => LINEAR
                .iter()
                .find(|linear| linear.test == test)
                .map(|linear| linear.deficit(result)),
        };
        if let Some(deficit) = deficit {
            self.set(test, deficit);
        }
    }

    /// Missing packages get the floored mean of the present ones (or 100 if
    /// none reported), plus a penalty.
    fn estimate_packages(&mut self) {
        let present: Vec<i64> =
            PACKAGES.iter().filter_map(|test| self.get(test)).collect();
        let mean = if present.is_empty() {
            100
        } else {
            present.iter().sum::<i64>().div_euclid(present.len() as i64)
        };
        for test in PACKAGES {
            if self.get(test).is_none() {
                self.set(test, mean + MISSING_PACKAGE_PENALTY);
            }
        }
    }

    fn into_json(self) -> json::Value {
        let mut score = json::Map::new();
        score.insert("total".to_string(), json!(self.total));
        for (test, deficit) in self.by_test {
            score.insert(test.to_string(), json!(deficit));
        }
        json::Value::Object(score)
    }
}

impl Linear {
    fn deficit(&self, result: &json::Value) -> i64 {
        match lookup(result, self.facts).filter(|facts| facts.is_object()) {
            Some(facts) => floor(
                self.terms
                    .iter()
                    .map(|(path, weight)| weight * number(facts, path))
                    .sum(),
            ),
            None => self.fallback,
        }
    }
}

fn lookup<'a>(
    value: &'a json::Value,
    path: &[&str],
) -> Option<&'a json::Value> {
    path.iter()
        .try_fold(value, |value, key| value.get(key))
        .filter(|value| !value.is_null())
}

fn number(value: &json::Value, path: &[&str]) -> f64 {
    lookup(value, path)
        .and_then(json::Value::as_f64)
        .unwrap_or_default()
}

fn floor(value: f64) -> i64 {
    value.floor() as i64
}

fn discount(discounts: &[(&str, f64)], rule: &str) -> f64 {
    discounts
        .iter()
        .find(|(name, _)| *name == rule)
        .map_or(0.0, |(_, discount)| *discount)
}

fn items(result: &json::Value) -> &[json::Value] {
    result
        .get("items")
        .and_then(json::Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn axe(result: &json::Value) -> Option<i64> {
    let facts = lookup(result, &["violations"])?;
    let discounted: f64 = items(result)
        .iter()
        .map(|item| {
            let rule = item.get("rule").and_then(json::Value::as_str);
            let elements = item
                .get("elements")
                .and_then(json::Value::as_array)
                .map_or(0, Vec::len);
            discount(AXE_DISCOUNTS, rule.unwrap_or_default()) * elements as f64
        })
        .sum();
    Some(floor(
        2.0 * number(facts, &["minor"])
            + 3.0 * number(facts, &["moderate"])
            + 4.0 * number(facts, &["serious"])
            + 5.0 * number(facts, &["critical"])
            - discounted,
    ))
}

fn ibm(result: &json::Value) -> Option<i64> {
    let facts = lookup(result, &["totals"])?;
    let discounted: f64 = items(result)
        .iter()
        .filter_map(|item| item.get("ruleId").and_then(json::Value::as_str))
        .map(|rule| discount(IBM_DISCOUNTS, rule))
        .sum();
    Some(floor(
        4.0 * number(facts, &["violation"])
            + 2.0 * number(facts, &["recommendation"])
            - discounted,
    ))
}

fn wave(result: &json::Value) -> Option<i64> {
    let facts = lookup(result, &["categories"])?;
    let mut discounted = 0.0;
    for level in ["error", "contrast", "alert"] {
        let Some(rules) = lookup(facts, &[level, "items"])
            .and_then(json::Value::as_object)
        else {
            continue;
        };
        for (rule, item) in rules {
            discounted +=
                discount(WAVE_DISCOUNTS, rule) * number(item, &["count"]);
        }
    }
    Some(floor(
        2.0 * number(facts, &["alert", "count"])
            + 3.0 * number(facts, &["contrast", "count"])
            + 4.0 * number(facts, &["error", "count"])
            - discounted,
    ))
}

/// The square root of the excess of visible elements over 150.
fn bulk(result: &json::Value) -> i64 {
    match result.get("visibleElements").and_then(json::Value::as_f64) {
        Some(count) => floor((count - 150.0).max(0.0).sqrt()),
        None => 100,
    }
}

fn motion(result: &json::Value) -> i64 {
    let recorded = result
        .get("bytes")
        .is_some_and(|bytes| bytes.as_f64().is_some_and(|b| b != 0.0));
    if !recorded {
        return 150;
    }
    let fact = |name: &str| number(result, &[name]);
    floor(
        15.0 * (fact("meanLocalRatio") - 1.0)
            + 15.0 * (fact("maxLocalRatio") - 1.0)
            + 15.0 * (fact("globalRatio") - 1.0)
            + fact("meanPixelChange") / 25000.0
            + fact("maxPixelChange") / 25000.0
            + 10.0 * fact("changeFrequency"),
    )
}

/// 2 per style beyond the most common one of each tag, plus 0.2 per element
/// not in its tag's most common style.
fn style_diff(result: &json::Value) -> i64 {
    let Some(tags) =
        lookup(result, &["totals"]).and_then(json::Value::as_object)
    else {
        return 100;
    };
    let sum: f64 = tags
        .values()
        .map(|tag| {
            let total = number(tag, &["total"]);
            let subtotals: Vec<f64> = tag
                .get("subtotals")
                .and_then(json::Value::as_array)
                .map(|subtotals| {
                    subtotals.iter().filter_map(json::Value::as_f64).collect()
                })
                .unwrap_or_else(|| vec![total]);
            let excess_styles = subtotals.len().saturating_sub(1) as f64;
            let plurality = subtotals.first().copied().unwrap_or(total);
            2.0 * excess_styles + 0.2 * (total - plurality)
        })
        .sum();
    floor(sum)
}
