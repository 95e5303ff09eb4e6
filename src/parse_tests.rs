#[cfg(test)]
mod tests {
    use crate::html::MarkupError;
    use crate::parse::{parse, ParseError, ParseOptions};
    use crate::syntax_tree::{BindingOwner, Document, Element, Node, VirtualElement};

    fn parse_ok(source: &str) -> Document {
        parse(source, ParseOptions::default()).unwrap()
    }

    fn element(node: &Node) -> &Element {
        match node {
            Node::Element(element) => element,
            other => panic!("expected element, got {:?}", other),
        }
    }

    fn virtual_element(node: &Node) -> &VirtualElement {
        match node {
            Node::VirtualElement(element) => element,
            other => panic!("expected virtual element, got {:?}", other),
        }
    }

    #[test]
    fn test_attribute_bindings_in_source_order() {
        let source = r#"<div data-bind="a: 1, b: 2"></div>"#;
        let document = parse_ok(source);
        let div = element(&document.children[0]);

        assert_eq!(div.bindings.len(), 2);
        assert_eq!(div.bindings[0].name.text, "a");
        assert_eq!(div.bindings[0].param.text, "1");
        assert_eq!(div.bindings[1].name.text, "b");
        assert_eq!(div.bindings[1].param.text, "2");
        assert!(div.binding_error.is_none());
        assert!(div
            .bindings
            .iter()
            .all(|binding| binding.owner == BindingOwner::Attribute { index: 0 }));
    }

    #[test]
    fn test_binding_ranges_point_into_source() {
        let source = r#"<p class="x" data-bind="text: name, visible: show"></p>"#;
        let document = parse_ok(source);
        let p = element(&document.children[0]);

        let text = &p.bindings[0];
        assert_eq!(text.name.range.slice(source), "text");
        assert_eq!(text.param.range.slice(source), "name");
        assert_eq!(text.range.slice(source), "text: name");
        assert_eq!(text.owner, BindingOwner::Attribute { index: 1 });
        assert_eq!(text.quote, Some('"'));

        let visible = &p.bindings[1];
        assert_eq!(visible.param.range.slice(source), "show");
        assert_eq!(visible.range.slice(source), "visible: show");
    }

    #[test]
    fn test_binding_quotes_follow_attribute() {
        let source = r#"<p data-bind='text: "a"'></p><i data-bind=text:b></i>"#;
        let document = parse_ok(source);

        let p = element(&document.children[0]);
        assert_eq!(p.bindings[0].quote, Some('\''));
        assert_eq!(p.bindings[0].param.text, "\"a\"");

        let i = element(&document.children[1]);
        assert_eq!(i.bindings[0].quote, None);
        assert_eq!(i.bindings[0].param.range.slice(source), "b");
    }

    #[test]
    fn test_string_keys() {
        let source = r#"<p data-bind="'text': x"></p>"#;
        let document = parse_ok(source);
        let p = element(&document.children[0]);
        assert_eq!(p.bindings[0].name.text, "text");
        assert_eq!(p.bindings[0].name.range.slice(source), "'text'");
    }

    #[test]
    fn test_invalid_binding_attribute_is_recorded() {
        for source in [
            r#"<p data-bind="text: ???"></p>"#,
            r#"<p data-bind="...spread"></p>"#,
            r#"<p data-bind="[key]: 1"></p>"#,
            r#"<p data-bind="get text() { return 1 }"></p>"#,
        ] {
            let document = parse_ok(source);
            let p = element(&document.children[0]);
            assert!(p.bindings.is_empty(), "{}", source);
            assert!(p.binding_error.is_some(), "{}", source);
        }
    }

    #[test]
    fn test_custom_binding_attributes() {
        let source = r#"<p data-bind="text: a" ko-bind="html: b"></p>"#;
        let document = parse(
            source,
            ParseOptions::default().with_binding_attributes(vec!["ko-bind".to_string()]),
        )
        .unwrap();
        let p = element(&document.children[0]);
        assert_eq!(p.bindings.len(), 1);
        assert_eq!(p.bindings[0].name.text, "html");
        assert_eq!(p.bindings[0].owner, BindingOwner::Attribute { index: 1 });
    }

    #[test]
    fn test_virtual_element() {
        let source = "<!-- ko if: show --><p></p><!-- /ko -->";
        let document = parse_ok(source);
        assert_eq!(document.children.len(), 1);

        let ko = virtual_element(&document.children[0]);
        assert!(!ko.hidden);
        assert_eq!(ko.binding.name.text, "if");
        assert_eq!(ko.binding.param.text, "show");
        assert_eq!(ko.binding.name.range.slice(source), "if");
        assert_eq!(ko.binding.param.range.slice(source), "show");
        assert_eq!(ko.binding.owner, BindingOwner::VirtualElement);
        assert_eq!(ko.binding.quote, None);
        assert_eq!(ko.start_comment.range.slice(source), "<!-- ko if: show -->");
        assert_eq!(ko.end_comment.range.slice(source), "<!-- /ko -->");
        assert_eq!(ko.range.slice(source), source);
        assert_eq!(ko.inner_range().slice(source), "<p></p>");
        assert_eq!(ko.children.len(), 1);
    }

    #[test]
    fn test_hidden_virtual_element() {
        let document = parse_ok("<!-- #ko with: item --><!-- /ko -->");
        let ko = virtual_element(&document.children[0]);
        assert!(ko.hidden);
        assert_eq!(ko.binding.name.text, "with");
        assert!(ko.children.is_empty());
        assert!(ko.inner_range().is_empty());
    }

    #[test]
    fn test_nested_virtual_elements_balance() {
        let source = "<!-- ko if: a --><!-- ko foreach: b --><i></i><!-- /ko --><!-- /ko --><b></b>";
        let document = parse_ok(source);
        assert_eq!(document.children.len(), 2);

        let outer = virtual_element(&document.children[0]);
        assert_eq!(outer.binding.name.text, "if");
        assert_eq!(outer.children.len(), 1);

        let inner = virtual_element(&outer.children[0]);
        assert_eq!(inner.binding.name.text, "foreach");
        assert_eq!(inner.binding.param.text, "b");
        assert_eq!(inner.children.len(), 1);

        assert_eq!(element(&document.children[1]).tag_name, "b");
    }

    #[test]
    fn test_virtual_elements_inside_elements() {
        let source = "<ul><!-- ko text: x --><!-- /ko --></ul>";
        let document = parse_ok(source);
        let ul = element(&document.children[0]);
        assert_eq!(ul.children.len(), 1);
        assert_eq!(virtual_element(&ul.children[0]).binding.name.text, "text");
    }

    #[test]
    fn test_unbalanced_virtual_element_is_fatal() {
        let source = "<div><!-- ko if: a --><p></p></div>";
        let error = parse(source, ParseOptions::default()).unwrap_err();
        let ParseError::UnbalancedVirtualElement { range } = error;
        assert_eq!(range.slice(source), "<!-- ko if: a -->");

        let nested = "<!-- ko if: a --><!-- ko if: b --><!-- /ko -->";
        assert!(parse(nested, ParseOptions::default()).is_err());
    }

    #[test]
    fn test_plain_comments_are_kept() {
        let document = parse_ok("<!-- just a comment --><!-- /ko -->");
        assert_eq!(document.children.len(), 2);
        assert!(document
            .children
            .iter()
            .all(|node| matches!(node, Node::Comment(_))));
    }

    #[test]
    fn test_markup_errors_are_reported_not_fatal() {
        let mut errors = Vec::new();
        let mut on_error = |error: MarkupError| errors.push(error);
        let document = parse(
            "<div></span></div>",
            ParseOptions::default().with_on_error(&mut on_error),
        )
        .unwrap();
        assert_eq!(document.children.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "end-tag-without-matching-open-element");
    }

    #[test]
    fn test_void_element_inner_range() {
        let source = r#"<input data-bind="value: v">"#;
        let document = parse_ok(source);
        let input = element(&document.children[0]);
        assert!(input.is_void());
        assert!(input.inner_range().is_empty());
        assert_eq!(input.inner_range().start.offset(), source.len());
        assert_eq!(input.bindings[0].name.text, "value");
    }

    #[test]
    fn test_document_range_spans_source() {
        let source = "a\n<b></b>\n";
        let document = parse_ok(source);
        assert_eq!(document.range.slice(source), source);
        assert_eq!(document.range.end.line, 2);
    }
}
