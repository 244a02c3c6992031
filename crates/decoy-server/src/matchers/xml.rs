//! XPath evaluation over XML text.

use sxd_document::parser;
use sxd_xpath::{evaluate_xpath, Value};

/// Evaluate each expression against `body`.
///
/// An expression matches when its result is truthy: a non-empty node set, a
/// non-empty string, a non-zero number or `true`. Unparsable XML matches nothing.
pub(crate) fn evaluate_all(body: &str, paths: &[String]) -> Vec<bool> {
    let package = match parser::parse(body) {
        Ok(package) => package,
        Err(_) => return vec![false; paths.len()],
    };
    let document = package.as_document();

    paths
        .iter()
        .map(|path| match evaluate_xpath(&document, path) {
            Ok(Value::Boolean(b)) => b,
            Ok(Value::Number(n)) => n != 0.0 && !n.is_nan(),
            Ok(Value::String(s)) => !s.is_empty(),
            Ok(Value::Nodeset(nodes)) => nodes.iter().next().is_some(),
            Err(_) => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: &str = r#"<order id="17"><item sku="a">2</item><item sku="b">1</item></order>"#;

    #[test]
    fn test_nodeset_and_boolean_results() {
        let paths = vec![
            "/order[@id='17']".to_string(),
            "count(/order/item) = 2".to_string(),
            "/order[@id='18']".to_string(),
        ];
        assert_eq!(evaluate_all(ORDER, &paths), vec![true, true, false]);
    }

    #[test]
    fn test_invalid_xml_or_expression() {
        assert_eq!(evaluate_all("<unclosed>", &["/a".to_string()]), vec![false]);
        assert_eq!(evaluate_all(ORDER, &["///".to_string()]), vec![false]);
    }
}
