use serde::Deserialize;
use serde_json::json;

use crate::browser::evaluation::evaluate;
use crate::browser::{DriverError, Page, scripts};

/// Texts an element can be identified by, read from the page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub text: Option<String>,
    pub aria_label: Option<String>,
    pub labels: Option<Vec<String>>,
    pub labelled_by: Option<Vec<String>>,
    pub placeholder: Option<String>,
}

impl Candidate {
    pub fn matches(&self, target: &str) -> bool {
        let contains = |text: &Option<String>| {
            text.as_deref().is_some_and(|text| text.contains(target))
        };
        let joined_contains = |texts: &Option<Vec<String>>| {
            texts
                .as_ref()
                .is_some_and(|texts| texts.join(" ").contains(target))
        };
        contains(&self.text)
            || contains(&self.aria_label)
            || joined_contains(&self.labels)
            || joined_contains(&self.labelled_by)
            || contains(&self.placeholder)
    }
}

/// The index of the first candidate identified by `target`.
pub fn match_index(candidates: &[Candidate], target: &str) -> Option<usize> {
    candidates
        .iter()
        .position(|candidate| candidate.matches(target))
}

/// Finds which element under `body` matching `selector` is identified by
/// `target`, as its index among those elements.
pub async fn resolve(
    page: &dyn Page,
    selector: &str,
    target: &str,
) -> Result<Option<usize>, DriverError> {
    let candidates: Vec<Candidate> =
        evaluate(page, scripts::CANDIDATES, vec![json!(selector)]).await?;
    let index = match_index(&candidates, target);
    log::debug!(
        "resolved {:?} among {} {:?} candidates: {:?}",
        target,
        candidates.len(),
        selector,
        index
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn text(text: &str) -> Candidate {
        Candidate {
            text: Some(text.to_string()),
            ..Candidate::default()
        }
    }

    #[test]
    fn test_no_candidates() {
        assert_eq!(match_index(&[], "Submit"), None);
    }

    #[test]
    fn test_matches_aria_label() {
        let candidates = [
            text("Open"),
            Candidate {
                aria_label: Some("Submit order".to_string()),
                ..Candidate::default()
            },
            text("Close"),
        ];
        assert_eq!(match_index(&candidates, "Submit"), Some(1));
    }

    #[test]
    fn test_matches_joined_labels_and_placeholder() {
        let labelled = Candidate {
            labels: Some(vec!["Given".to_string(), "name".to_string()]),
            ..Candidate::default()
        };
        let referenced = Candidate {
            labelled_by: Some(vec!["Postal".to_string(), "code".to_string()]),
            ..Candidate::default()
        };
        let placeholder = Candidate {
            placeholder: Some("Search the site".to_string()),
            ..Candidate::default()
        };
        let candidates = [labelled, referenced, placeholder];
        assert_eq!(match_index(&candidates, "Given name"), Some(0));
        assert_eq!(match_index(&candidates, "Postal code"), Some(1));
        assert_eq!(match_index(&candidates, "Search"), Some(2));
        assert_eq!(match_index(&candidates, "Surname"), None);
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert_eq!(match_index(&[text("Submit")], "submit"), None);
    }

    proptest! {
        #[test]
        fn test_first_containing_candidate_wins(
            texts in proptest::collection::vec("[a-c]{0,4}", 0..8),
            target in "[a-c]{1,2}",
        ) {
            let candidates: Vec<Candidate> =
                texts.iter().map(|t| text(t)).collect();
            let expected = texts.iter().position(|t| t.contains(&target));
            prop_assert_eq!(match_index(&candidates, &target), expected);
        }
    }
}
