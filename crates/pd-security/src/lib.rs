//! Attribute hardening rules and the ordered set they run in.

mod policy;
mod rules;
mod url;

pub use crate::policy::ReferrerPolicy;
pub use crate::policy::SchemeAllowList;
pub use crate::rules::BUILTIN_RULES;
pub use crate::rules::Rule;
pub use crate::url::Resolution;
pub use crate::url::UrlResolver;

use std::sync::Arc;

use pd_core::PdResult;
use pd_dom::Element;

/// Read-only state shared by every rule application in one traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleContext {
    resolver: UrlResolver,
}

impl RuleContext {
    pub fn new(resolver: UrlResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &UrlResolver {
        &self.resolver
    }
}

/// Extension point for caller-supplied rules.
///
/// A rule sees one element at a time and may only change its attributes.
/// Returning an error aborts the traversal; the tree keeps whatever changes
/// were made up to that point.
pub trait ElementRule: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, element: &mut Element, context: &RuleContext) -> PdResult<()>;
}

/// Enabled rules in run order: built-ins in registry order, then custom
/// rules in insertion order. Built-in names are unique.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl RuleSet {
    /// Every built-in rule with its default options.
    pub fn defaults() -> Self {
        let rules = BUILTIN_RULES.into_iter().filter_map(Rule::builtin).collect();
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds `rule`, replacing a built-in of the same name.
    pub fn with(mut self, rule: Rule) -> Self {
        self.insert(rule);
        self
    }

    pub fn with_custom(self, rule: Arc<dyn ElementRule>) -> Self {
        self.with(Rule::Custom(rule))
    }

    pub fn without(mut self, name: &str) -> Self {
        self.remove(name);
        self
    }

    pub fn insert(&mut self, rule: Rule) {
        if !rule.is_custom() {
            let name = rule.name().to_owned();
            self.rules
                .retain(|existing| existing.is_custom() || existing.name() != name);
        }
        self.rules.push(rule);
        self.rules.sort_by_key(Rule::order);
    }

    /// Removes built-in rules named `name`. Returns whether one was present.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules
            .retain(|existing| existing.is_custom() || existing.name() != name);
        self.rules.len() != before
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(Rule::name).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every rule against `element` in order, stopping at the first
    /// error. Returns how many rules ran.
    pub fn apply(&self, element: &mut Element, context: &RuleContext) -> PdResult<usize> {
        for rule in &self.rules {
            rule.apply(element, context)?;
        }
        Ok(self.rules.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pd_core::ErrorKind;
    use pd_core::PdError;
    use pd_core::PdResult;
    use pd_dom::Element;

    use super::ElementRule;
    use super::ReferrerPolicy;
    use super::Rule;
    use super::RuleContext;
    use super::RuleSet;

    struct Stamp(&'static str);

    impl ElementRule for Stamp {
        fn name(&self) -> &str {
            self.0
        }

        fn apply(&self, element: &mut Element, _context: &RuleContext) -> PdResult<()> {
            element.set_attribute("data-stamp", self.0);
            Ok(())
        }
    }

    struct Refuse;

    impl ElementRule for Refuse {
        fn name(&self) -> &str {
            "refuse"
        }

        fn apply(&self, element: &mut Element, _context: &RuleContext) -> PdResult<()> {
            Err(PdError::new(
                ErrorKind::RuleFailed,
                format!("refusing <{}>", element.local_name()),
            ))
        }
    }

    #[test]
    fn defaults_run_in_registry_order() {
        assert_eq!(
            RuleSet::defaults().names(),
            vec![
                "blankTarget",
                "noopener",
                "httpsLinks",
                "httpsForms",
                "validateURI",
                "referrerPolicy"
            ]
        );
    }

    #[test]
    fn insertion_keeps_registry_order_and_replaces_builtins() {
        let rules = RuleSet::empty()
            .with_custom(Arc::new(Stamp("first")))
            .with(Rule::ReferrerPolicy(ReferrerPolicy::Origin))
            .with(Rule::BlankTarget)
            .with_custom(Arc::new(Stamp("second")))
            .with(Rule::ReferrerPolicy(ReferrerPolicy::SameOrigin));

        assert_eq!(
            rules.names(),
            vec!["blankTarget", "referrerPolicy", "first", "second"]
        );
        assert!(matches!(
            rules.get("referrerPolicy"),
            Some(Rule::ReferrerPolicy(ReferrerPolicy::SameOrigin))
        ));
        assert_eq!(rules.without("blankTarget").len(), 3);
    }

    #[test]
    fn custom_rules_run_after_builtins() {
        let rules = RuleSet::empty()
            .with_custom(Arc::new(Stamp("late")))
            .with(Rule::BlankTarget);
        let mut anchor = Element::html("a");
        assert_eq!(rules.apply(&mut anchor, &RuleContext::default()), Ok(2));
        assert_eq!(
            anchor.attributes().collect::<Vec<_>>(),
            vec![("target", "_blank"), ("data-stamp", "late")]
        );
    }

    #[test]
    fn failing_rule_stops_the_chain() {
        let rules = RuleSet::empty()
            .with(Rule::Noopener)
            .with_custom(Arc::new(Refuse))
            .with_custom(Arc::new(Stamp("never")));
        let mut anchor = Element::html("a");

        match rules.apply(&mut anchor, &RuleContext::default()) {
            Err(error) => assert_eq!(error.kind, ErrorKind::RuleFailed),
            Ok(count) => panic!("expected failure, ran {count} rules"),
        }
        assert_eq!(anchor.get_attribute("rel"), Some("noopener noreferrer"));
        assert!(!anchor.has_attribute("data-stamp"));
    }
}
