//! Pipeline component classification.
//!
//! Rules are checked in order and the first one with a matching needle wins,
//! so an identifier such as `Sort after Merge Join` is a merge join.
//! Matching is case-sensitive against both the designer's default names
//! (`Merge Join`) and the component class IDs (`Microsoft.MergeJoin`).

use crate::model::ComponentKind;

struct Rule {
    kind: ComponentKind,
    needles: &'static [&'static str],
}

const RULES: [Rule; 5] = [
    Rule {
        kind: ComponentKind::MergeJoin,
        needles: &["Merge Join", "MergeJoin"],
    },
    Rule {
        kind: ComponentKind::Sort,
        needles: &["Sort"],
    },
    Rule {
        kind: ComponentKind::DerivedColumn,
        needles: &["Derived Column", "DerivedColumn"],
    },
    Rule {
        kind: ComponentKind::Lookup,
        needles: &["Lookup"],
    },
    Rule {
        kind: ComponentKind::OleDbSource,
        needles: &["OLE DB Source", "OLEDBSource"],
    },
];

/// Classify a single identifier or type string.
pub fn classify(identifier: &str) -> ComponentKind {
    RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|needle| identifier.contains(needle)))
        .map(|rule| rule.kind)
        .unwrap_or(ComponentKind::Unclassified)
}

/// Classify by identifier, falling back to the class ID when the
/// identifier (a renamed component) says nothing.
pub fn classify_component(identifier: &str, class_id: Option<&str>) -> ComponentKind {
    match classify(identifier) {
        ComponentKind::Unclassified => class_id
            .map(classify)
            .unwrap_or(ComponentKind::Unclassified),
        kind => kind,
    }
}

/// Whether a component is an OLE DB source, for query extraction. The class
/// ID decides when it names the source; the display kind is only used for
/// components whose class ID is absent or opaque (a CLSID).
pub fn is_ole_db_source(kind: ComponentKind, class_id: Option<&str>) -> bool {
    match class_id {
        Some(id) if id.to_ascii_lowercase().contains("oledbsource") => true,
        Some(id) if id.contains('.') => false,
        _ => kind == ComponentKind::OleDbSource,
    }
}
