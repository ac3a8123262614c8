//! Per-resource outcomes and their script-visible aggregation.

use std::fmt;

use serde::Serialize;

/// One resource's result from one action invocation.
///
/// `err` is empty on success; `result` is empty on failure.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ActionOutcome {
    /// Identifier of the resource the action ran against.
    pub resource: String,
    /// Error text, empty on success.
    pub err: String,
    /// Produced path or other action payload, empty on failure.
    pub result: String,
}

impl ActionOutcome {
    /// Builds a successful outcome.
    #[must_use]
    pub fn success(resource: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            err: String::new(),
            result: result.into(),
        }
    }

    /// Builds a failed outcome carrying `err`'s display text.
    #[must_use]
    pub fn failure(resource: impl Into<String>, err: &impl fmt::Display) -> Self {
        Self {
            resource: resource.into(),
            err: err.to_string(),
            result: String::new(),
        }
    }

    /// Whether the outcome carries no error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.err.is_empty()
    }
}

/// Shape requested by the call site.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultShape {
    /// Return a bare outcome when exactly one resource was targeted.
    Singular,
    /// Always return a list.
    List,
}

/// Script-visible value produced by an action.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionResult {
    /// The only outcome of a single-resource invocation.
    Single(ActionOutcome),
    /// Outcomes in resource resolution order.
    List(Vec<ActionOutcome>),
}

impl ActionResult {
    /// Combines `outcomes` according to `shape`.
    ///
    /// No cross-resource error collapsing happens here; callers inspect each
    /// outcome's `err` themselves.
    #[must_use]
    pub fn aggregate(mut outcomes: Vec<ActionOutcome>, shape: ResultShape) -> Self {
        if shape == ResultShape::Singular && outcomes.len() == 1
            && let Some(outcome) = outcomes.pop()
        {
            return Self::Single(outcome);
        }
        Self::List(outcomes)
    }

    /// Outcomes in resource order, whatever the shape.
    #[must_use]
    pub fn outcomes(&self) -> &[ActionOutcome] {
        match self {
            Self::Single(outcome) => std::slice::from_ref(outcome),
            Self::List(outcomes) => outcomes,
        }
    }

    /// Whether any outcome carries an error.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.outcomes().iter().any(|outcome| !outcome.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn outcomes(count: usize) -> Vec<ActionOutcome> {
        (0..count)
            .map(|index| ActionOutcome::success(format!("host-{index}"), format!("/w/{index}")))
            .collect()
    }

    #[rstest]
    #[case(1, ResultShape::Singular, true)]
    #[case(2, ResultShape::Singular, false)]
    #[case(0, ResultShape::Singular, false)]
    #[case(1, ResultShape::List, false)]
    fn aggregate_picks_shape(
        #[case] count: usize,
        #[case] shape: ResultShape,
        #[case] single: bool,
    ) {
        let result = ActionResult::aggregate(outcomes(count), shape);
        assert_eq!(matches!(result, ActionResult::Single(_)), single);
        assert_eq!(result.outcomes().len(), count);
    }

    #[test]
    fn aggregate_preserves_order_and_does_not_collapse_errors() {
        let mut list = outcomes(3);
        if let Some(middle) = list.get_mut(1) {
            *middle = ActionOutcome::failure("host-1", &"connection refused");
        }
        let result = ActionResult::aggregate(list, ResultShape::Singular);
        let ids = result
            .outcomes()
            .iter()
            .map(|outcome| outcome.resource.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["host-0", "host-1", "host-2"]);
        assert!(result.has_failures());
        assert_eq!(
            result
                .outcomes()
                .iter()
                .filter(|outcome| outcome.is_success())
                .count(),
            2
        );
    }

    #[test]
    fn serializes_with_script_field_names() {
        let single = ActionResult::aggregate(outcomes(1), ResultShape::Singular);
        let json = serde_json::to_string(&single).expect("serialize");
        assert_eq!(json, r#"{"resource":"host-0","err":"","result":"/w/0"}"#);

        let list = ActionResult::aggregate(outcomes(1), ResultShape::List);
        let list_json = serde_json::to_string(&list).expect("serialize");
        assert!(list_json.starts_with('['), "{list_json}");
    }
}
