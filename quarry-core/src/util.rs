use crate::Value;
use std::fmt::Write;

pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

/// Largest char boundary not greater than `index`.
pub fn char_floor(value: &str, index: usize) -> usize {
    let mut index = index.min(value.len());
    while !value.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Escape the LIKE wildcards of `value` using `\` as the escape character.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render parameters for diagnostics, one per line prefixed by their 1-based position.
pub fn printable_params(params: &[Value]) -> String {
    let mut out = String::new();
    separated_by(
        &mut out,
        params.iter().enumerate(),
        |out, (i, v)| {
            let _ = write!(out, "{}: {}", i + 1, v);
        },
        "\n",
    );
    out
}

#[macro_export]
macro_rules! possibly_parenthesized {
    ($buff:ident, $cond:expr, $v:expr) => {
        if $cond {
            $buff.push('(');
            $v;
            $buff.push(')');
        } else {
            $v;
        }
    };
}

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            &$query[..$crate::char_floor(&$query, 497)].trim_end(),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separated() {
        let mut out = String::from("(");
        separated_by(&mut out, [1, 2, 3], |out, v| out.push_str(&v.to_string()), ", ");
        out.push(')');
        assert_eq!(out, "(1, 2, 3)");
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("100%_off"), r"100\%\_off");
        assert_eq!(escape_like(r"a\b[c]"), r"a\\b\[c]");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn truncation() {
        let long = "x".repeat(600);
        let text = format!("{}", truncate_long!(long));
        assert_eq!(text.len(), 500);
        assert!(text.ends_with("..."));
        let short = "SELECT 1";
        assert_eq!(format!("{}", truncate_long!(short)), "SELECT 1");
    }
}
