/// Whether the `&` at `at` begins a well-formed character reference.
///
/// Contract:
/// - Named references: `&` + ASCII alphanumerics + `;` (`&amp;`, `&nbsp;`,
///   `&NotANamedRef;`). The name is not checked against the entity table; an
///   unknown name is harmless inside a double-quoted value.
/// - Numeric references only when semicolon-terminated: `&#123;` and `&#x1F4A9;`.
/// - Digit and name runs are bounded so adversarial input stays linear.
///
/// Anything else is a bare ampersand that must be written as `&amp;`.
pub(crate) fn starts_char_ref(bytes: &[u8], at: usize) -> bool {
    debug_assert_eq!(bytes.get(at), Some(&b'&'));
    const MAX_NAME: usize = 32;
    const MAX_HEX_DIGITS: usize = 6; // 0x10FFFF
    const MAX_DEC_DIGITS: usize = 7; // 1114111

    let rest = &bytes[at + 1..];
    match rest {
        [b'#', b'x' | b'X', digits @ ..] => terminated_run(digits, MAX_HEX_DIGITS, |b| {
            b.is_ascii_hexdigit()
        }),
        [b'#', digits @ ..] => terminated_run(digits, MAX_DEC_DIGITS, |b| b.is_ascii_digit()),
        name => terminated_run(name, MAX_NAME, |b| b.is_ascii_alphanumeric()),
    }
}

/// A non-empty run of at most `max` accepted bytes followed by `;`.
fn terminated_run(bytes: &[u8], max: usize, accept: impl Fn(u8) -> bool) -> bool {
    let run = bytes
        .iter()
        .take(max + 1)
        .take_while(|&&b| accept(b))
        .count();
    run > 0 && run <= max && bytes.get(run) == Some(&b';')
}

#[cfg(test)]
mod tests {
    use super::starts_char_ref;

    fn check(text: &str) -> bool {
        starts_char_ref(text.as_bytes(), 0)
    }

    #[test]
    fn recognizes_terminated_references() {
        for text in ["&amp;", "&lt;x", "&#34;", "&#x1F4A9;", "&#X41;", "&Unknown1;"] {
            assert!(check(text), "{text} starts a reference");
        }
    }

    #[test]
    fn bare_ampersands() {
        for text in ["&", "& b", "&amp", "&#;", "&#x;", "&#12a;", "&;", "&#12345678;"] {
            assert!(!check(text), "{text} is a bare ampersand");
        }
    }

    #[test]
    fn overlong_names_are_bare() {
        let long = format!("&{};", "a".repeat(40));
        assert!(!check(&long));
    }
}
