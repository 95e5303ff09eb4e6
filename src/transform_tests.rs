#[cfg(test)]
mod tests {
    use crate::eval::EvalError;
    use crate::transform::{to_access, transform, DEFAULT_QUOTE};

    fn access(name: &str) -> String {
        to_access(name, DEFAULT_QUOTE, "", "")
    }

    #[test]
    fn test_access_shape() {
        assert_eq!(
            to_access("name", '\'', "", ""),
            "('name' in $context ? $context['name'] : $data !== null && typeof $data === 'object' && 'name' in $data ? $data['name'] : name)"
        );
    }

    #[test]
    fn test_identifier() {
        assert_eq!(transform("foo", DEFAULT_QUOTE).unwrap(), access("foo"));
    }

    #[test]
    fn test_member_property_names_are_kept() {
        assert_eq!(
            transform("foo.bar.baz", DEFAULT_QUOTE).unwrap(),
            format!("{}.bar.baz", access("foo"))
        );
        assert_eq!(
            transform("foo[bar]", DEFAULT_QUOTE).unwrap(),
            format!("{}[{}]", access("foo"), access("bar"))
        );
    }

    #[test]
    fn test_typeof_moves_into_branches() {
        assert_eq!(
            transform("typeof foo", DEFAULT_QUOTE).unwrap(),
            to_access("foo", DEFAULT_QUOTE, "typeof ", "")
        );
        let transformed = transform("typeof foo", DEFAULT_QUOTE).unwrap();
        assert!(transformed.contains("typeof $data[\"foo\"]"));
        assert!(transformed.ends_with(": typeof foo)"));
    }

    #[test]
    fn test_update_expressions() {
        assert_eq!(
            transform("++foo", DEFAULT_QUOTE).unwrap(),
            to_access("foo", DEFAULT_QUOTE, "++", "")
        );
        let postfix = transform("foo--", '\'').unwrap();
        assert_eq!(postfix, to_access("foo", '\'', "", "--"));
        assert!(postfix.contains("$data['foo']--"));
    }

    #[test]
    fn test_arrow_parameters_stay_local() {
        let transformed = transform("items.map(x => x + offset)", DEFAULT_QUOTE).unwrap();
        assert_eq!(
            transformed,
            format!("{}.map(x => x + {})", access("items"), access("offset"))
        );
        assert!(!transformed.contains("\"x\" in"));

        let unary = transform("x => typeof x", DEFAULT_QUOTE).unwrap();
        assert_eq!(unary, "x => typeof x");
    }

    #[test]
    fn test_function_locals_stay_local() {
        let transformed = transform("function (a) { var b = a; return b + c; }", DEFAULT_QUOTE).unwrap();
        assert!(transformed.contains("var b = a; return b + "));
        assert!(transformed.contains(&access("c")));
        assert!(!transformed.contains(&access("a")));
    }

    #[test]
    fn test_shorthand_properties() {
        assert_eq!(
            transform("{ foo, bar: 1 }", DEFAULT_QUOTE).unwrap(),
            format!("{{ foo: {}, bar: 1 }}", access("foo"))
        );
    }

    #[test]
    fn test_literals_are_untouched() {
        assert_eq!(transform("'a' + 1", DEFAULT_QUOTE).unwrap(), "'a' + 1");
        assert_eq!(transform("[true, null]", DEFAULT_QUOTE).unwrap(), "[true, null]");
    }

    #[test]
    fn test_syntax_error() {
        let error = transform("foo +", DEFAULT_QUOTE).unwrap_err();
        assert!(matches!(error, EvalError::Syntax { .. }));
    }
}
