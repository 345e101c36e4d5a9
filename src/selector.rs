//! Label selectors and their translation into a [`MetricRequest`].
//!
//! The external metrics API hands queries over as Kubernetes label selectors.
//! Selector values keep their case because Azure resource identifiers are
//! case sensitive.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, trace};

use crate::request::{self, MetricRequest, RequestField};
use crate::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    DoubleEquals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl Operator {
    pub fn is_equality(&self) -> bool {
        matches!(self, Operator::Equals | Operator::DoubleEquals)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "=",
            Operator::DoubleEquals => "==",
            Operator::NotEquals => "!=",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::Exists => "exists",
            Operator::DoesNotExist => "!",
        };
        f.write_str(s)
    }
}

/// One `key operator values` constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

impl Requirement {
    pub fn new(key: impl Into<String>, operator: Operator, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            values,
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, Operator::Equals, vec![value.into()])
    }
}

/// Requirements in the order they were written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn new(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl FromIterator<Requirement> for Selector {
    fn from_iter<I: IntoIterator<Item = Requirement>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl FromStr for Selector {
    type Err = BridgeError;

    /// Parses the textual selector form, e.g.
    /// `metricName=Requests,resourceGroup=rg,tier in (a,b),!legacy`.
    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Selector::default());
        }
        split_terms(s)?
            .into_iter()
            .map(parse_term)
            .collect::<Result<Vec<_>>>()
            .map(Selector::new)
    }
}

fn split_terms(s: &str) -> Result<Vec<&str>> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| BridgeError::MalformedSelector(format!("unbalanced ')' in '{}'", s)))?;
            }
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(BridgeError::MalformedSelector(format!("unbalanced '(' in '{}'", s)));
    }
    terms.push(&s[start..]);
    Ok(terms)
}

fn parse_term(term: &str) -> Result<Requirement> {
    let term = term.trim();
    if term.is_empty() {
        return Err(BridgeError::MalformedSelector("empty requirement".to_string()));
    }

    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::new(checked_key(key, term)?, Operator::DoesNotExist, vec![]));
    }

    if let Some(open) = term.find('(') {
        let head = term[..open].trim();
        let body = term[open + 1..]
            .trim_end()
            .strip_suffix(')')
            .ok_or_else(|| BridgeError::MalformedSelector(format!("expected ')' in '{}'", term)))?;
        let (key, operator) = if let Some(key) = head.strip_suffix(" notin") {
            (key, Operator::NotIn)
        } else if let Some(key) = head.strip_suffix(" in") {
            (key, Operator::In)
        } else {
            return Err(BridgeError::MalformedSelector(format!(
                "expected 'in' or 'notin' in '{}'",
                term
            )));
        };
        let values = body
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>();
        if values.is_empty() {
            return Err(BridgeError::MalformedSelector(format!("empty value set in '{}'", term)));
        }
        return Ok(Requirement::new(checked_key(key, term)?, operator, values));
    }

    let (key, operator, value) = if let Some((key, value)) = term.split_once("!=") {
        (key, Operator::NotEquals, value)
    } else if let Some((key, value)) = term.split_once("==") {
        (key, Operator::DoubleEquals, value)
    } else if let Some((key, value)) = term.split_once('=') {
        (key, Operator::Equals, value)
    } else {
        return Ok(Requirement::new(checked_key(term, term)?, Operator::Exists, vec![]));
    };

    Ok(Requirement::new(
        checked_key(key, term)?,
        operator,
        vec![value.trim().to_string()],
    ))
}

fn checked_key(key: &str, term: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() || key.contains(|c: char| c.is_whitespace() || "=!()".contains(c)) {
        return Err(BridgeError::MalformedSelector(format!("invalid key in '{}'", term)));
    }
    Ok(key.to_string())
}

/// Builds a [`MetricRequest`] from the equality requirements of `selector`.
///
/// `subscriptionID` starts as `default_subscription_id` and is replaced when
/// the selector carries its own value. The timespan is always computed here.
pub fn parse_metric_request(
    selector: Option<&Selector>,
    default_subscription_id: &str,
) -> Result<MetricRequest> {
    debug!("Parsing a received metric selector");
    trace!("{:?}", selector);

    let selector = selector
        .ok_or_else(|| BridgeError::MalformedSelector("metric selector cannot be empty".to_string()))?;

    let mut metric_req = MetricRequest {
        timespan: request::timespan(),
        subscription_id: default_subscription_id.to_string(),
        ..Default::default()
    };

    for requirement in selector.requirements() {
        if !requirement.operator.is_equality() {
            return Err(BridgeError::UnsupportedOperator {
                key: requirement.key.clone(),
                operator: requirement.operator.to_string(),
            });
        }

        let field: RequestField = requirement.key.parse()?;
        let value = requirement.values.first().ok_or_else(|| {
            BridgeError::MalformedSelector(format!("no value for key '{}'", requirement.key))
        })?;
        debug!(key = %field, value = %value, "Checking selector key");

        *field.slot(&mut metric_req) = match field {
            RequestField::Filter => {
                let formatted = request::format_filter(value)?;
                debug!(filter = %formatted, "Formatted filter");
                formatted
            }
            RequestField::SubscriptionId => {
                debug!("Overriding default subscription id");
                value.clone()
            }
            _ => value.clone(),
        };
    }

    info!(metric = %metric_req.metric_name, "Successfully parsed metric request");
    Ok(metric_req)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(pairs: &[(&str, &str)]) -> Selector {
        pairs.iter().map(|(k, v)| Requirement::equals(*k, *v)).collect()
    }

    #[test]
    fn test_missing_selector_is_malformed() {
        assert!(matches!(
            parse_metric_request(None, "sub-A"),
            Err(BridgeError::MalformedSelector(_))
        ));
    }

    #[test]
    fn test_single_key_populates_only_its_field() {
        for field in RequestField::ALL {
            // filter values are reformatted, so feed it a well-formed one
            let value = if field == RequestField::Filter { "a_eq_b" } else { "v" };
            let req = parse_metric_request(Some(&selector(&[(field.key(), value)])), "default").unwrap();

            assert!(!req.timespan.is_empty());
            for other in RequestField::ALL {
                let got = other.value(&req);
                if other == field {
                    let expected = if field == RequestField::Filter { "a eq 'b'" } else { "v" };
                    assert_eq!(got, expected, "{}", field);
                } else if other == RequestField::SubscriptionId {
                    assert_eq!(got, "default");
                } else {
                    assert!(got.is_empty(), "{} leaked into {}", field, other);
                }
            }
        }
    }

    #[test]
    fn test_non_equality_operators_rejected() {
        let operators = [
            Operator::NotEquals,
            Operator::In,
            Operator::NotIn,
            Operator::Exists,
            Operator::DoesNotExist,
        ];
        for op in operators {
            let sel = Selector::new(vec![
                Requirement::equals("metricName", "Requests"),
                Requirement::new("resourceGroup", op, vec!["rg".into()]),
            ]);
            match parse_metric_request(Some(&sel), "sub-A") {
                Err(BridgeError::UnsupportedOperator { key, .. }) => assert_eq!(key, "resourceGroup"),
                other => panic!("expected UnsupportedOperator for {}, got {:?}", op, other),
            }
        }
    }

    #[test]
    fn test_double_equals_is_equality() {
        let sel: Selector = "metricName==Requests".parse().unwrap();
        let req = parse_metric_request(Some(&sel), "sub-A").unwrap();
        assert_eq!(req.metric_name, "Requests");
    }

    #[test]
    fn test_unknown_key_rejected_in_any_position() {
        let known = [("metricName", "m"), ("resourceGroup", "rg")];
        for pos in 0..=known.len() {
            let mut pairs = known.to_vec();
            pairs.insert(pos, ("bogus", "x"));
            match parse_metric_request(Some(&selector(&pairs)), "sub-A") {
                Err(BridgeError::UnknownSelectorKey(key)) => assert_eq!(key, "bogus"),
                other => panic!("expected UnknownSelectorKey, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_subscription_override() {
        let req = parse_metric_request(Some(&selector(&[("subscriptionID", "sub-B")])), "sub-A").unwrap();
        assert_eq!(req.subscription_id, "sub-B");

        let req = parse_metric_request(Some(&selector(&[("metricName", "m")])), "sub-A").unwrap();
        assert_eq!(req.subscription_id, "sub-A");
    }

    #[test]
    fn test_malformed_filter_fails() {
        let sel = selector(&[("filter", "cpu_eq")]);
        assert!(matches!(
            parse_metric_request(Some(&sel), "sub-A"),
            Err(BridgeError::MalformedFilter(_))
        ));
    }

    #[test]
    fn test_parsed_shared_fields_validate() {
        let sel = selector(&[("metricName", "Requests"), ("resourceGroup", "rg")]);
        let req = parse_metric_request(Some(&sel), "sub-A").unwrap();
        assert!(req.validate().is_ok());

        let sel = selector(&[
            ("metricName", "Requests"),
            ("resourceGroup", "rg"),
            ("subscriptionID", "sub-B"),
        ]);
        let req = parse_metric_request(Some(&sel), "").unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_missing_default_subscription_fails_validation() {
        let sel = selector(&[("metricName", "Requests"), ("resourceGroup", "rg")]);
        let req = parse_metric_request(Some(&sel), "").unwrap();
        assert!(matches!(req.validate(), Err(BridgeError::MissingField("subscriptionID"))));
    }

    #[test]
    fn test_selector_text_forms() {
        let sel: Selector = "metricName=Requests, tier in (a, b),env notin (dev),!legacy,team,x!=y"
            .parse()
            .unwrap();
        let reqs = sel.requirements();
        assert_eq!(reqs.len(), 6);
        assert_eq!(reqs[0], Requirement::equals("metricName", "Requests"));
        assert_eq!(reqs[1].operator, Operator::In);
        assert_eq!(reqs[1].values, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(reqs[2].operator, Operator::NotIn);
        assert_eq!(reqs[3].operator, Operator::DoesNotExist);
        assert_eq!(reqs[3].key, "legacy");
        assert_eq!(reqs[4].operator, Operator::Exists);
        assert_eq!(reqs[5].operator, Operator::NotEquals);
    }

    #[test]
    fn test_selector_keeps_value_case_and_order() {
        let sel: Selector = "resourceGroup=MyRG,metricName=Percentage CPU".parse().unwrap();
        let keys: Vec<_> = sel.requirements().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["resourceGroup", "metricName"]);
        assert_eq!(sel.requirements()[1].values[0], "Percentage CPU");
    }

    #[test]
    fn test_malformed_selector_text() {
        for text in ["a=b,,c=d", "tier in (a", "tier (a)", "=x", "tier in ()", "!a=b"] {
            assert!(
                matches!(text.parse::<Selector>(), Err(BridgeError::MalformedSelector(_))),
                "{} should be rejected",
                text
            );
        }
        assert!("".parse::<Selector>().unwrap().is_empty());
    }
}
