//! Built-in hardening rules.

use core::fmt;
use std::sync::Arc;

use pd_core::PdResult;
use pd_dom::Element;
use pd_dom::Namespace;
use tracing::trace;

use crate::ElementRule;
use crate::RuleContext;
use crate::policy::ReferrerPolicy;
use crate::policy::SchemeAllowList;
use crate::url::Resolution;

/// Names of the built-in rules, in the order they run.
pub const BUILTIN_RULES: [&str; 6] = [
    "blankTarget",
    "noopener",
    "httpsLinks",
    "httpsForms",
    "validateURI",
    "referrerPolicy",
];

/// Attributes `validateURI` inspects, in order.
const URI_ATTRIBUTES: [&str; 3] = ["href", "action", "xlink:href"];

/// One entry of a [`crate::RuleSet`].
#[derive(Clone)]
pub enum Rule {
    /// `target="_blank"` on link-like elements.
    BlankTarget,
    /// `rel="noopener noreferrer"` on anchors.
    Noopener,
    /// Upgrades `http` anchor targets to `https`.
    HttpsLinks,
    /// Upgrades `http` form actions to `https`.
    HttpsForms,
    /// Drops URL attributes whose scheme is not allowed.
    ValidateUri(SchemeAllowList),
    /// Writes `referrerpolicy` where the element supports it.
    ReferrerPolicy(ReferrerPolicy),
    /// Caller-supplied rule, run after the built-ins.
    Custom(Arc<dyn ElementRule>),
}

impl Rule {
    /// The built-in rule called `name`, with its default options.
    pub fn builtin(name: &str) -> Option<Self> {
        let rule = match name {
            "blankTarget" => Self::BlankTarget,
            "noopener" => Self::Noopener,
            "httpsLinks" => Self::HttpsLinks,
            "httpsForms" => Self::HttpsForms,
            "validateURI" => Self::ValidateUri(SchemeAllowList::default()),
            "referrerPolicy" => Self::ReferrerPolicy(ReferrerPolicy::default()),
            _ => return None,
        };
        Some(rule)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::BlankTarget => "blankTarget",
            Self::Noopener => "noopener",
            Self::HttpsLinks => "httpsLinks",
            Self::HttpsForms => "httpsForms",
            Self::ValidateUri(_) => "validateURI",
            Self::ReferrerPolicy(_) => "referrerPolicy",
            Self::Custom(rule) => rule.name(),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Position in the run order; custom rules share the last slot.
    pub(crate) fn order(&self) -> usize {
        match self {
            Self::Custom(_) => BUILTIN_RULES.len(),
            builtin => BUILTIN_RULES
                .iter()
                .position(|name| *name == builtin.name())
                .unwrap_or(BUILTIN_RULES.len()),
        }
    }

    pub fn apply(&self, element: &mut Element, context: &RuleContext) -> PdResult<()> {
        match self {
            Self::BlankTarget => blank_target(element),
            Self::Noopener => noopener(element),
            Self::HttpsLinks => https_links(element, context),
            Self::HttpsForms => https_forms(element, context),
            Self::ValidateUri(schemes) => validate_uri(element, schemes, context),
            Self::ReferrerPolicy(policy) => referrer_policy(element, *policy),
            Self::Custom(rule) => return rule.apply(element, context),
        }
        Ok(())
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidateUri(schemes) => f.debug_tuple("ValidateUri").field(schemes).finish(),
            Self::ReferrerPolicy(policy) => {
                f.debug_tuple("ReferrerPolicy").field(policy).finish()
            }
            Self::Custom(rule) => f.debug_tuple("Custom").field(&rule.name()).finish(),
            other => f.write_str(other.name()),
        }
    }
}

fn supports_target(element: &Element) -> bool {
    match element.namespace() {
        Namespace::Html => matches!(element.local_name(), "a" | "area" | "base" | "form"),
        Namespace::Svg => element.local_name() == "a",
        Namespace::MathMl => false,
    }
}

fn supports_referrer_policy(element: &Element) -> bool {
    element.namespace() == Namespace::Html
        && matches!(
            element.local_name(),
            "a" | "area" | "iframe" | "img" | "link" | "script"
        )
}

fn blank_target(element: &mut Element) {
    if supports_target(element) {
        element.set_attribute("target", "_blank");
    }

    // Links without a target property still get a new-window hint.
    if !element.has_attribute("target")
        && (element.has_attribute("xlink:href") || element.has_attribute("href"))
    {
        element.set_attribute("xlink:show", "new");
    }
}

fn noopener(element: &mut Element) {
    if element.is_html("a") {
        element.set_attribute("rel", "noopener noreferrer");
    }
}

fn https_links(element: &mut Element, context: &RuleContext) {
    if element.is_html("a") {
        upgrade_to_https(element, "href", context);
    }
}

fn https_forms(element: &mut Element, context: &RuleContext) {
    if element.is_html("form") {
        upgrade_to_https(element, "action", context);
    }
}

fn upgrade_to_https(element: &mut Element, attribute: &str, context: &RuleContext) {
    let Some(value) = element.get_attribute(attribute) else {
        return;
    };
    let Resolution::Absolute(mut url) = context.resolver().resolve(value) else {
        return;
    };
    if url.scheme() != "http" || url.set_scheme("https").is_err() {
        return;
    }

    trace!(
        element = element.local_name(),
        attribute,
        "upgraded attribute to https"
    );
    element.set_attribute(attribute, String::from(url));
}

fn validate_uri(element: &mut Element, schemes: &SchemeAllowList, context: &RuleContext) {
    for attribute in URI_ATTRIBUTES {
        let Some(value) = element.get_attribute(attribute) else {
            continue;
        };
        let keep = match context.resolver().resolve(value) {
            Resolution::Absolute(url) => schemes.allows(url.scheme()),
            Resolution::Relative => true,
            Resolution::Invalid => false,
        };
        if !keep {
            trace!(
                element = element.local_name(),
                attribute,
                "removed attribute with disallowed scheme"
            );
            element.remove_attribute(attribute);
        }
    }
}

fn referrer_policy(element: &mut Element, policy: ReferrerPolicy) {
    if supports_referrer_policy(element) {
        element.set_attribute("referrerPolicy", policy.as_str());
    }
}
