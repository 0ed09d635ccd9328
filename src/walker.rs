//! Namespace-qualified path queries over a parsed document.
//!
//! Every query is tried in two tiers: exact namespace first, then any
//! namespace (local names compared ASCII case-insensitively, since tool
//! versions disagree on both). A path that matches in neither tier is absent
//! and yields an empty result, never an error.

use roxmltree::Node;
use tracing::debug;

/// One step of a relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Direct child elements with this local name.
    Child(&'static str),
    /// Descendant-or-self elements with this local name, at any depth.
    Descendant(&'static str),
}

impl Step {
    fn local_name(self) -> &'static str {
        match self {
            Self::Child(name) | Self::Descendant(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Exact,
    AnyNamespace,
}

#[derive(Debug, Clone, Copy)]
pub struct Walker<'s> {
    namespace: &'s str,
}

impl<'s> Walker<'s> {
    pub fn new(namespace: &'s str) -> Self {
        Self { namespace }
    }

    /// All nodes reached by `path` from `scope`, in document order.
    pub fn find_all<'a, 'i>(&self, scope: Node<'a, 'i>, path: &[Step]) -> Vec<Node<'a, 'i>> {
        self.find_with_tier(scope, path).0
    }

    /// Like [`Walker::find_all`], also reporting which tier matched.
    pub fn find_with_tier<'a, 'i>(
        &self,
        scope: Node<'a, 'i>,
        path: &[Step],
    ) -> (Vec<Node<'a, 'i>>, Tier) {
        let exact = self.walk(scope, path, Tier::Exact);
        if !exact.is_empty() {
            return (exact, Tier::Exact);
        }

        let any = self.walk(scope, path, Tier::AnyNamespace);
        if !any.is_empty() {
            debug!(
                "Path {:?} not found in '{}', matched {} node(s) in any namespace",
                path,
                self.namespace,
                any.len()
            );
        }
        (any, Tier::AnyNamespace)
    }

    pub fn find_first<'a, 'i>(&self, scope: Node<'a, 'i>, path: &[Step]) -> Option<Node<'a, 'i>> {
        self.find_all(scope, path).into_iter().next()
    }

    /// Attribute lookup with the same fallback: qualified, unqualified, then
    /// any namespace ignoring case.
    pub fn attribute<'a>(&self, node: Node<'a, '_>, local: &str) -> Option<&'a str> {
        node.attribute((self.namespace, local))
            .or_else(|| node.attribute(local))
            .or_else(|| {
                node.attributes()
                    .find(|a| a.name().eq_ignore_ascii_case(local))
                    .map(|a| a.value())
            })
    }

    fn walk<'a, 'i>(&self, scope: Node<'a, 'i>, path: &[Step], tier: Tier) -> Vec<Node<'a, 'i>> {
        let mut current = vec![scope];

        for step in path {
            let mut next: Vec<Node<'a, 'i>> = Vec::new();
            for node in &current {
                match step {
                    Step::Child(_) => next.extend(
                        node.children().filter(|n| self.matches(*n, step.local_name(), tier)),
                    ),
                    Step::Descendant(_) => next.extend(
                        node.descendants().filter(|n| self.matches(*n, step.local_name(), tier)),
                    ),
                }
            }

            // Overlapping descendant scopes can reach the same node twice.
            next.sort_by_key(|n| n.range().start);
            next.dedup_by_key(|n| n.range().start);

            if next.is_empty() {
                return next;
            }
            current = next;
        }

        current
    }

    fn matches(&self, node: Node<'_, '_>, local: &str, tier: Tier) -> bool {
        if !node.is_element() {
            return false;
        }
        let tag = node.tag_name();
        match tier {
            Tier::Exact => tag.namespace() == Some(self.namespace) && tag.name() == local,
            Tier::AnyNamespace => tag.name().eq_ignore_ascii_case(local),
        }
    }
}

/// Concatenated text of a node and all its descendants.
pub fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    const NS: &str = "urn:report";

    #[test]
    fn test_exact_path() {
        let xml = r#"<Report xmlns="urn:report">
            <DataSets>
              <DataSet Name="A"><Query><CommandText>select 1</CommandText></Query></DataSet>
              <DataSet Name="B"/>
            </DataSets>
          </Report>"#;
        let doc = Document::parse(xml).unwrap();
        let walker = Walker::new(NS);
        let (sets, tier) = walker.find_with_tier(
            doc.root_element(),
            &[Step::Descendant("DataSets"), Step::Descendant("DataSet")],
        );
        assert_eq!(tier, Tier::Exact);
        let names: Vec<_> = sets.iter().filter_map(|n| n.attribute("Name")).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_missing_path_is_empty() {
        let doc = Document::parse(r#"<Report xmlns="urn:report"><Body/></Report>"#).unwrap();
        let walker = Walker::new(NS);
        assert!(walker
            .find_all(doc.root_element(), &[Step::Descendant("DataSources"), Step::Descendant("DataSource")])
            .is_empty());
    }

    #[test]
    fn test_wildcard_fallback() {
        // DataSets redeclared under another tool version's namespace.
        let xml = r#"<Report xmlns="urn:report">
            <DataSets xmlns="urn:older-report">
              <DataSet Name="Sales"/>
            </DataSets>
          </Report>"#;
        let doc = Document::parse(xml).unwrap();
        let walker = Walker::new(NS);
        let (sets, tier) = walker.find_with_tier(
            doc.root_element(),
            &[Step::Descendant("DataSets"), Step::Descendant("DataSet")],
        );
        assert_eq!(tier, Tier::AnyNamespace);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].attribute("Name"), Some("Sales"));
    }

    #[test]
    fn test_descendant_tolerates_extra_nesting() {
        let xml = r#"<Query xmlns="urn:report"><Wrapper><Inner><CommandText>x</CommandText></Inner></Wrapper></Query>"#;
        let doc = Document::parse(xml).unwrap();
        let walker = Walker::new(NS);
        let text = walker.find_first(doc.root_element(), &[Step::Descendant("CommandText")]);
        assert_eq!(text.map(text_content).as_deref(), Some("x"));
    }

    #[test]
    fn test_child_step_is_strict() {
        let xml = r#"<M xmlns="urn:report"><ConnectionManagers>
              <ConnectionManager id="outer"><ObjectData><ConnectionManager id="inner"/></ObjectData></ConnectionManager>
            </ConnectionManagers></M>"#;
        let doc = Document::parse(xml).unwrap();
        let walker = Walker::new(NS);
        let managers = walker.find_all(
            doc.root_element(),
            &[Step::Descendant("ConnectionManagers"), Step::Child("ConnectionManager")],
        );
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].attribute("id"), Some("outer"));
    }

    #[test]
    fn test_attribute_tiers() {
        let xml = r#"<x:E xmlns:x="urn:report" x:ObjectName="qualified" refId="plain" Other="o"/>"#;
        let doc = Document::parse(xml).unwrap();
        let walker = Walker::new(NS);
        let node = doc.root_element();
        assert_eq!(walker.attribute(node, "ObjectName"), Some("qualified"));
        assert_eq!(walker.attribute(node, "refId"), Some("plain"));
        assert_eq!(walker.attribute(node, "other"), Some("o"));
        assert_eq!(walker.attribute(node, "missing"), None);
    }

    #[test]
    fn test_text_content_joins_fragments() {
        let doc = Document::parse("<T>select <![CDATA[a < b]]> from t</T>").unwrap();
        assert_eq!(text_content(doc.root_element()), "select a < b from t");
    }
}
