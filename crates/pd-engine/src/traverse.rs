//! Single-pass rule application over a working tree.

use pd_core::PdResult;
use pd_dom::Document;
use pd_dom::NodeId;
use pd_dom::NodeIterator;
use pd_dom::WhatToShow;
use pd_security::RuleContext;
use pd_security::RuleSet;

/// Node kinds the traversal visits.
pub const VISITED_KINDS: WhatToShow = WhatToShow::ELEMENT
    .union(WhatToShow::TEXT)
    .union(WhatToShow::COMMENT);

/// Counters from one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalReport {
    /// Element, text and comment nodes visited, including the root.
    pub visited: usize,
    pub elements: usize,
    pub rule_applications: usize,
}

/// Visits `root` and its descendants in document order and runs `rules` on
/// every element. The first rule error stops the walk and is returned as is;
/// attributes already rewritten stay rewritten.
pub fn traverse(
    document: &mut Document,
    root: NodeId,
    rules: &RuleSet,
    context: &RuleContext,
) -> PdResult<TraversalReport> {
    let mut iterator = NodeIterator::new(root, VISITED_KINDS);
    let mut report = TraversalReport::default();

    while let Some(id) = iterator.next_node(document) {
        report.visited = report.visited.saturating_add(1);
        let Some(element) = document.element_mut(id) else {
            continue;
        };
        report.elements = report.elements.saturating_add(1);
        let applied = rules.apply(element, context)?;
        report.rule_applications = report.rule_applications.saturating_add(applied);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pd_core::ErrorKind;
    use pd_core::PdError;
    use pd_core::PdResult;
    use pd_dom::Document;
    use pd_dom::Element;
    use pd_security::ElementRule;
    use pd_security::Rule;
    use pd_security::RuleContext;
    use pd_security::RuleSet;

    use super::traverse;

    struct FailOn(&'static str);

    impl ElementRule for FailOn {
        fn name(&self) -> &str {
            "failOn"
        }

        fn apply(&self, element: &mut Element, _context: &RuleContext) -> PdResult<()> {
            if element.local_name() == self.0 {
                return Err(PdError::new(ErrorKind::RuleFailed, "refused"));
            }
            Ok(())
        }
    }

    /// `body > (a, "text", <!--c-->, <?pi?>, div > a)`
    fn sample() -> (Document, pd_dom::NodeId) {
        let mut doc = Document::html_shell();
        let Some(body) = doc.body() else {
            panic!("shell has no body");
        };
        let first = doc.create_element(Element::html("a"));
        let comment = doc.create_comment("c");
        let pi = doc.create_processing_instruction("pi", "");
        let div = doc.create_element(Element::html("div"));
        let second = doc.create_element(Element::html("a"));
        assert!(doc.append_child(body, first).is_ok());
        assert!(doc.append_text(body, "text").is_ok());
        for node in [comment, pi, div] {
            assert!(doc.append_child(body, node).is_ok());
        }
        assert!(doc.append_child(div, second).is_ok());
        (doc, body)
    }

    #[test]
    fn reports_every_visited_node_once() {
        let (mut doc, body) = sample();
        let rules = RuleSet::empty().with(Rule::BlankTarget).with(Rule::Noopener);
        let report = match traverse(&mut doc, body, &rules, &RuleContext::default()) {
            Ok(report) => report,
            Err(error) => panic!("traversal failed: {error}"),
        };
        assert_eq!(report.visited, 6);
        assert_eq!(report.elements, 4);
        assert_eq!(report.rule_applications, 8);

        let targets = doc
            .descendants(body)
            .filter_map(|id| doc.element(id))
            .filter(|el| el.get_attribute("target") == Some("_blank"))
            .count();
        assert_eq!(targets, 2);
    }

    #[test]
    fn empty_rule_set_still_walks() {
        let (mut doc, body) = sample();
        let report = traverse(&mut doc, body, &RuleSet::empty(), &RuleContext::default());
        assert!(matches!(report, Ok(report) if report.visited == 6 && report.rule_applications == 0));
    }

    #[test]
    fn rule_error_aborts_and_keeps_earlier_changes() {
        let (mut doc, body) = sample();
        let rules = RuleSet::empty()
            .with(Rule::BlankTarget)
            .with_custom(Arc::new(FailOn("div")));

        match traverse(&mut doc, body, &rules, &RuleContext::default()) {
            Err(error) => assert_eq!(error.kind, ErrorKind::RuleFailed),
            Ok(report) => panic!("expected failure: {report:?}"),
        }

        let anchors: Vec<Option<&str>> = doc
            .descendants(body)
            .filter_map(|id| doc.element(id))
            .filter(|el| el.is_html("a"))
            .map(|el| el.get_attribute("target"))
            .collect();
        assert_eq!(anchors, vec![Some("_blank"), None]);
    }
}
