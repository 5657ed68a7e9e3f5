//! Inline client scripts
//!
//! Small helpers that ship a JavaScript function expression to the browser
//! together with JSON-encoded arguments. The source is emitted verbatim; only
//! the arguments are serialized.

use serde_json::Value;

use crate::node::Node;

/// Run `source` once when the browser parses it
///
/// Produces `<script>(source)(...args)</script>`.
pub fn invoke(source: &str, args: &[Value]) -> Node {
    Node::text(format!(
        "<script>({source})(...{})</script>",
        Value::Array(args.to_vec())
    ))
}

/// Run `source` for every `event` whose target matches `selector`
///
/// The listener is delegated from `document.body`, so it also covers
/// elements streamed in after the script ran.
pub fn bind(selector: &str, event: &str, source: &str, args: &[Value]) -> Node {
    Node::text(format!(
        "<script>document.body.addEventListener({},(event) => event.target.matches({}) && ({source})(event, ...{}))</script>",
        Value::from(event),
        Value::from(selector),
        Value::Array(args.to_vec())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(node: Node) -> String {
        match node {
            Node::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_invoke() {
        assert_eq!(
            text(invoke("(n) => console.log(n)", &[json!(3)])),
            "<script>((n) => console.log(n))(...[3])</script>"
        );
        assert_eq!(
            text(invoke("() => init()", &[])),
            "<script>(() => init())(...[])</script>"
        );
    }

    #[test]
    fn test_bind_quotes_selector_and_event() {
        assert_eq!(
            text(bind(
                "button.inc",
                "click",
                "(e, step) => bump(step)",
                &[json!(2)]
            )),
            "<script>document.body.addEventListener(\"click\",(event) => event.target.matches(\"button.inc\") && ((e, step) => bump(step))(event, ...[2]))</script>"
        );
    }
}
