//! Resolution of caller options into an immutable [`SanitizeOptions`].

use pd_security::ReferrerPolicy;
use pd_security::Rule;
use pd_security::RuleContext;
use pd_security::RuleSet;
use pd_security::SchemeAllowList;
use pd_security::UrlResolver;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;
use url::Url;

/// Options for one sanitize call.
#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    /// Work on the `html` element instead of the body's contents.
    pub whole_document: bool,
    /// Hand back the tree instead of serialized markup.
    pub return_tree: bool,
    pub rules: RuleSet,
    /// Document URL relative attribute values resolve against.
    pub base_url: Option<Url>,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            whole_document: false,
            return_tree: false,
            rules: RuleSet::defaults(),
            base_url: None,
        }
    }
}

impl SanitizeOptions {
    /// Reads an options record. Never fails: anything malformed is replaced
    /// by its default, with a warning.
    pub fn resolve(config: &Value) -> Self {
        let Some(record) = config.as_object() else {
            if !config.is_null() {
                warn!(found = kind_of(config), "options must be an object; using defaults");
            }
            return Self::default();
        };

        let return_tree = match record.get("returnTree") {
            Some(value) if !value.is_null() => flag(value, "returnTree"),
            _ => record
                .get("returnDOM")
                .map(|value| flag(value, "returnDOM"))
                .unwrap_or(false),
        };

        Self {
            whole_document: record
                .get("wholeDocument")
                .map(|value| flag(value, "wholeDocument"))
                .unwrap_or(false),
            return_tree,
            rules: resolve_rules(record.get("rules")),
            base_url: record.get("baseUrl").and_then(resolve_base_url),
        }
    }

    pub fn with_whole_document(mut self, whole_document: bool) -> Self {
        self.whole_document = whole_document;
        self
    }

    pub fn with_return_tree(mut self, return_tree: bool) -> Self {
        self.return_tree = return_tree;
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn rule_context(&self) -> RuleContext {
        let resolver = match &self.base_url {
            Some(base) => UrlResolver::with_base(base.clone()),
            None => UrlResolver::new(),
        };
        RuleContext::new(resolver)
    }
}

fn flag(value: &Value, key: &str) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Null => false,
        other => {
            warn!(key, found = kind_of(other), "option must be a boolean; using false");
            false
        }
    }
}

fn resolve_rules(value: Option<&Value>) -> RuleSet {
    let entries = match value {
        None | Some(Value::Null) => return RuleSet::defaults(),
        Some(Value::Object(entries)) => entries,
        Some(other) => {
            warn!(found = kind_of(other), "`rules` must be an object; using default rules");
            return RuleSet::defaults();
        }
    };

    let mut rules = RuleSet::empty();
    for (name, value) in entries {
        let Some(rule) = Rule::builtin(name) else {
            warn!(rule = name.as_str(), "ignoring unknown rule");
            continue;
        };

        match value {
            Value::Bool(false) | Value::Null => {}
            Value::Bool(true) => rules.insert(rule),
            Value::Object(options) => rules.insert(with_options(rule, options)),
            other => {
                warn!(
                    rule = name.as_str(),
                    found = kind_of(other),
                    "rule entry must be true or an object; enabling with defaults"
                );
                rules.insert(rule);
            }
        }
    }
    rules
}

fn with_options(rule: Rule, options: &Map<String, Value>) -> Rule {
    match rule {
        Rule::ValidateUri(_) => Rule::ValidateUri(scheme_option(options)),
        Rule::ReferrerPolicy(_) => Rule::ReferrerPolicy(policy_option(options)),
        other => other,
    }
}

fn scheme_option(options: &Map<String, Value>) -> SchemeAllowList {
    let value = match options.get("schemes") {
        Some(value) if !value.is_null() => Some(value),
        _ => options.get("validSchemes"),
    };

    match value {
        None | Some(Value::Null) => SchemeAllowList::default(),
        Some(Value::Array(entries)) => {
            let schemes: Vec<&str> = entries
                .iter()
                .filter_map(|entry| {
                    let scheme = entry.as_str();
                    if scheme.is_none() {
                        warn!(found = kind_of(entry), "skipping non-string scheme");
                    }
                    scheme
                })
                .collect();
            let list = SchemeAllowList::lenient(schemes.iter().copied());
            if list.len() < schemes.len() {
                warn!(
                    requested = schemes.len(),
                    kept = list.len(),
                    "dropped invalid or duplicate schemes"
                );
            }
            list
        }
        Some(other) => {
            warn!(found = kind_of(other), "schemes must be an array; using http and https");
            SchemeAllowList::default()
        }
    }
}

fn policy_option(options: &Map<String, Value>) -> ReferrerPolicy {
    match options.get("policy") {
        None | Some(Value::Null) => ReferrerPolicy::default(),
        Some(Value::String(token)) => ReferrerPolicy::parse(token).unwrap_or_else(|| {
            warn!(policy = token.as_str(), "unknown referrer policy; using no-referrer");
            ReferrerPolicy::default()
        }),
        Some(other) => {
            warn!(found = kind_of(other), "policy must be a string; using no-referrer");
            ReferrerPolicy::default()
        }
    }
}

fn resolve_base_url(value: &Value) -> Option<Url> {
    let Some(input) = value.as_str() else {
        if !value.is_null() {
            warn!(found = kind_of(value), "baseUrl must be a string; ignoring it");
        }
        return None;
    };

    match UrlResolver::parse_base(input) {
        Ok(resolver) => resolver.base().cloned(),
        Err(error) => {
            warn!(%error, "ignoring unusable baseUrl");
            None
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use pd_security::ReferrerPolicy;
    use pd_security::Rule;
    use serde_json::json;

    use super::SanitizeOptions;

    fn scheme_names(options: &SanitizeOptions) -> Vec<String> {
        match options.rules.get("validateURI") {
            Some(Rule::ValidateUri(schemes)) => schemes.iter().map(str::to_owned).collect(),
            other => panic!("validateURI not configured: {other:?}"),
        }
    }

    #[test]
    fn non_objects_resolve_to_defaults() {
        for config in [json!(null), json!("rules"), json!(7), json!([1, 2])] {
            let options = SanitizeOptions::resolve(&config);
            assert!(!options.whole_document);
            assert!(!options.return_tree);
            assert_eq!(options.rules.len(), 6);
            assert!(options.base_url.is_none());
        }
    }

    #[test]
    fn reads_flags() {
        let options = SanitizeOptions::resolve(&json!({"wholeDocument": true, "returnTree": true}));
        assert!(options.whole_document);
        assert!(options.return_tree);

        let options = SanitizeOptions::resolve(&json!({"wholeDocument": "yes"}));
        assert!(!options.whole_document);
    }

    #[test]
    fn return_dom_is_an_alias_that_loses_to_return_tree() {
        assert!(SanitizeOptions::resolve(&json!({"returnDOM": true})).return_tree);
        assert!(!SanitizeOptions::resolve(&json!({"returnDOM": true, "returnTree": false})).return_tree);
        assert!(SanitizeOptions::resolve(&json!({"returnDOM": false, "returnTree": true})).return_tree);
    }

    #[test]
    fn explicit_rules_replace_the_default_set() {
        let options = SanitizeOptions::resolve(&json!({
            "rules": {
                "referrerPolicy": {"policy": "origin"},
                "blankTarget": true,
                "noopener": false,
                "httpsLinks": null,
                "madeUp": true,
                "httpsForms": 1
            }
        }));
        assert_eq!(
            options.rules.names(),
            vec!["blankTarget", "httpsForms", "referrerPolicy"]
        );
        assert!(matches!(
            options.rules.get("referrerPolicy"),
            Some(Rule::ReferrerPolicy(ReferrerPolicy::Origin))
        ));
    }

    #[test]
    fn malformed_rules_fall_back_to_defaults() {
        let options = SanitizeOptions::resolve(&json!({"rules": "all"}));
        assert_eq!(options.rules.len(), 6);
        let options = SanitizeOptions::resolve(&json!({"rules": {}}));
        assert!(options.rules.is_empty());
    }

    #[test]
    fn scheme_options_accept_both_spellings() {
        let options = SanitizeOptions::resolve(&json!({
            "rules": {"validateURI": {"schemes": ["HTTPS:", "mailto", 3]}}
        }));
        assert_eq!(scheme_names(&options), vec!["https", "mailto"]);

        let options = SanitizeOptions::resolve(&json!({
            "rules": {"validateURI": {"validSchemes": ["ftp"]}}
        }));
        assert_eq!(scheme_names(&options), vec!["ftp"]);

        let options = SanitizeOptions::resolve(&json!({
            "rules": {"validateURI": {"schemes": []}}
        }));
        assert_eq!(scheme_names(&options), vec!["http", "https"]);

        let options = SanitizeOptions::resolve(&json!({"rules": {"validateURI": true}}));
        assert_eq!(scheme_names(&options), vec!["http", "https"]);
    }

    #[test]
    fn invalid_referrer_policy_uses_default() {
        let options = SanitizeOptions::resolve(&json!({
            "rules": {"referrerPolicy": {"policy": "leak-everything"}}
        }));
        assert!(matches!(
            options.rules.get("referrerPolicy"),
            Some(Rule::ReferrerPolicy(ReferrerPolicy::NoReferrer))
        ));
    }

    #[test]
    fn base_url_is_optional_and_validated() {
        let options = SanitizeOptions::resolve(&json!({"baseUrl": "http://example.com/a/"}));
        assert_eq!(
            options.base_url.as_ref().map(|url| url.as_str()),
            Some("http://example.com/a/")
        );
        assert!(SanitizeOptions::resolve(&json!({"baseUrl": "relative/path"})).base_url.is_none());
        assert!(SanitizeOptions::resolve(&json!({"baseUrl": 42})).base_url.is_none());
    }

    #[test]
    fn resolution_leaves_the_config_untouched() {
        let config = json!({"rules": {"validateURI": {"schemes": ["HTTP"]}}, "extra": [1]});
        let before = config.clone();
        let _ = SanitizeOptions::resolve(&config);
        assert_eq!(config, before);
    }
}
