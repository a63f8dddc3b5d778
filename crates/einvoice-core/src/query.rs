//! Path queries over [`XmlDocument`] trees.
//!
//! [`PathQueryEngine`] understands the absolute location paths used for key
//! field extraction: `/` and `//` steps over prefixed or unprefixed element
//! names, `*`, and an optional trailing `text()`.

use std::ptr;

use crate::error::QueryError;
use crate::xml::{Element, XmlDocument};

/// Evaluates a path expression against a document.
pub trait QueryEngine: Send + Sync {
    /// String value of the first matching node, or `None` if nothing matches.
    ///
    /// `namespaces` binds the prefixes used in `expression`. An error means
    /// the expression itself is broken.
    fn evaluate(
        &self,
        document: &XmlDocument,
        expression: &str,
        namespaces: &[(&str, &str)],
    ) -> Result<Option<String>, QueryError>;
}

/// Built-in engine for absolute location paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathQueryEngine;

impl PathQueryEngine {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Any,
    Name {
        namespace: Option<String>,
        local_name: String,
    },
    Text,
}

impl NodeTest {
    fn matches(&self, element: &Element) -> bool {
        match self {
            NodeTest::Any => true,
            NodeTest::Name {
                namespace,
                local_name,
            } => element.local_name == *local_name && element.namespace == *namespace,
            NodeTest::Text => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
}

impl QueryEngine for PathQueryEngine {
    fn evaluate(
        &self,
        document: &XmlDocument,
        expression: &str,
        namespaces: &[(&str, &str)],
    ) -> Result<Option<String>, QueryError> {
        let steps = compile(expression, namespaces)?;

        // `None` is the document node.
        let mut context: Option<Vec<&Element>> = None;
        for step in &steps {
            let mut candidates = Vec::new();
            match &context {
                None => {
                    if let Some(root) = document.root_element() {
                        candidates.push(root);
                        if step.axis == Axis::Descendant {
                            collect_descendants(root, &mut candidates);
                        }
                    }
                }
                Some(elements) => {
                    for element in elements {
                        match step.axis {
                            Axis::Child => candidates.extend(element.child_elements()),
                            Axis::Descendant => collect_descendants(element, &mut candidates),
                        }
                    }
                }
            }

            let mut next: Vec<&Element> = Vec::new();
            for candidate in candidates {
                if step.test.matches(candidate) && !next.iter().any(|e| ptr::eq(*e, candidate)) {
                    next.push(candidate);
                }
            }
            if next.is_empty() {
                return Ok(None);
            }
            context = Some(next);
        }

        Ok(context
            .and_then(|elements| elements.first().map(|e| e.text().trim().to_string())))
    }
}

fn collect_descendants<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    for child in element.child_elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

fn syntax(expression: &str, reason: &str) -> QueryError {
    QueryError::Syntax {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}

fn compile(expression: &str, namespaces: &[(&str, &str)]) -> Result<Vec<Step>, QueryError> {
    let expr = expression.trim();
    if !expr.starts_with('/') {
        return Err(syntax(expression, "expression must be an absolute path"));
    }

    let mut steps = Vec::new();
    let mut rest = expr;
    while !rest.is_empty() {
        let (axis, after) = if let Some(after) = rest.strip_prefix("//") {
            (Axis::Descendant, after)
        } else if let Some(after) = rest.strip_prefix('/') {
            (Axis::Child, after)
        } else {
            return Err(syntax(expression, "expected '/'"));
        };

        let end = after.find('/').unwrap_or(after.len());
        let token = &after[..end];
        if token.is_empty() {
            return Err(syntax(expression, "empty location step"));
        }
        steps.push(Step {
            axis,
            test: parse_test(expression, token, namespaces)?,
        });
        rest = &after[end..];
    }

    // text() only selects the string value, which is what the result is anyway.
    if let Some(position) = steps.iter().position(|s| s.test == NodeTest::Text) {
        if position + 1 != steps.len() || position == 0 || steps[position].axis != Axis::Child {
            return Err(syntax(expression, "text() must be the last child step"));
        }
        steps.pop();
    }

    Ok(steps)
}

fn parse_test(expression: &str, token: &str, namespaces: &[(&str, &str)]) -> Result<NodeTest, QueryError> {
    if token == "*" {
        return Ok(NodeTest::Any);
    }
    if token == "text()" {
        return Ok(NodeTest::Text);
    }

    let (prefix, local_name) = match token.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, token),
    };

    if !is_name(local_name) || prefix.is_some_and(|p| !is_name(p)) {
        return Err(syntax(expression, &format!("invalid name test {:?}", token)));
    }

    let namespace = match prefix {
        Some(prefix) => {
            let uri = namespaces
                .iter()
                .find(|(p, _)| *p == prefix)
                .map(|(_, uri)| uri.to_string())
                .ok_or_else(|| QueryError::UnboundPrefix(prefix.to_string()))?;
            Some(uri)
        }
        None => None,
    };

    Ok(NodeTest::Name {
        namespace,
        local_name: local_name.to_string(),
    })
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const XR: &str = "urn:ce.eu:en16931:2017:xoev-de:kosit:standard:xrechnung-1";

    fn document() -> XmlDocument {
        XmlDocument::parse_str(&format!(
            r#"<xr:invoice xmlns:xr="{XR}">
                 <xr:Invoice_number> RE-1 </xr:Invoice_number>
                 <xr:SELLER>
                   <xr:Seller_name>Acme</xr:Seller_name>
                 </xr:SELLER>
                 <xr:BUYER>
                   <xr:Seller_name>Wrong</xr:Seller_name>
                 </xr:BUYER>
                 <plain>x</plain>
               </xr:invoice>"#
        ))
        .unwrap()
    }

    fn eval(expression: &str) -> Result<Option<String>, QueryError> {
        PathQueryEngine::new().evaluate(&document(), expression, &[("xr", XR)])
    }

    #[test]
    fn test_descendant_and_child_steps() {
        assert_eq!(eval("//xr:invoice/xr:Invoice_number").unwrap(), Some("RE-1".to_string()));
        assert_eq!(eval("//xr:Seller_name").unwrap(), Some("Acme".to_string()));
        assert_eq!(eval("/xr:invoice/xr:SELLER/xr:Seller_name/text()").unwrap(), Some("Acme".to_string()));
        assert_eq!(eval("/xr:invoice/*/xr:Seller_name").unwrap(), Some("Acme".to_string()));
        assert_eq!(eval("//plain").unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(eval("//xr:Invoice_issue_date").unwrap(), None);
        assert_eq!(eval("/xr:SELLER").unwrap(), None);
    }

    #[test]
    fn test_broken_expressions() {
        assert!(matches!(eval("xr:invoice"), Err(QueryError::Syntax { .. })));
        assert!(matches!(eval("///xr:invoice"), Err(QueryError::Syntax { .. })));
        assert!(matches!(eval("//xr:invoice/"), Err(QueryError::Syntax { .. })));
        assert!(matches!(eval("//xr:[1]"), Err(QueryError::Syntax { .. })));
        assert!(matches!(eval("//text()"), Err(QueryError::Syntax { .. })));
        assert!(matches!(eval("//zz:invoice"), Err(QueryError::UnboundPrefix(p)) if p == "zz"));
    }

    #[test]
    fn test_empty_document() {
        let doc = XmlDocument::default();
        let value = PathQueryEngine::new().evaluate(&doc, "//xr:invoice", &[("xr", XR)]).unwrap();
        assert_eq!(value, None);
    }
}
