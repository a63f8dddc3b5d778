//! File-system safe names for sellers and invoice references.

/// Device names that can not be used as file names on Windows.
const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | ' ')
}

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// Collapse space runs left behind by dropped characters and strip leading
/// and trailing dots and spaces.
fn tidy(name: &str) -> String {
    let mut collapsed = String::with_capacity(name.len());
    for c in name.chars() {
        if c == ' ' && collapsed.ends_with(' ') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches(|c| c == '.' || c == ' ').to_string()
}

/// Turn a seller name into a directory name.
///
/// Characters other than letters, digits, `-`, `_`, `.`, `~` and space are
/// dropped. Never returns an empty string, and applying it twice gives the
/// same result as applying it once.
pub fn sanitize_seller_name(name: &str) -> String {
    let kept: String = name.trim().chars().filter(|c| is_allowed(*c)).collect();
    let mut sanitized = tidy(&kept);

    if is_reserved(&sanitized) {
        sanitized.insert(0, '_');
    }
    if sanitized.is_empty() {
        sanitized.push('_');
    }
    sanitized
}

/// Turn an invoice reference into a file name component.
///
/// Disallowed characters are replaced with `-` rather than dropped so that
/// distinct references stay distinct.
pub fn sanitize_reference(reference: &str) -> String {
    let replaced: String = reference
        .trim()
        .chars()
        .map(|c| if is_allowed(c) { c } else { '-' })
        .collect();
    let mut sanitized = tidy(&replaced);

    if sanitized.is_empty() {
        sanitized.push_str("_na_ref_");
    }
    if is_reserved(&sanitized) {
        sanitized.insert(0, '_');
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLES: [&str; 12] = [
        "Acme & Co.",
        "  ..Hidden Corp..  ",
        "Müller & Söhne GmbH",
        "a  .  b",
        "con",
        "LPT9",
        "",
        "   ",
        "...",
        "@@@",
        "Foo/Bar\\Baz: Ltd?",
        ". . x . .",
    ];

    #[test]
    fn test_seller_name() {
        assert_eq!(sanitize_seller_name("Acme & Co."), "Acme Co");
        assert_eq!(sanitize_seller_name("  ..Hidden Corp..  "), "Hidden Corp");
        assert_eq!(sanitize_seller_name("Müller & Söhne GmbH"), "Müller Söhne GmbH");
        assert_eq!(sanitize_seller_name("Foo/Bar\\Baz: Ltd?"), "FooBarBaz Ltd");
    }

    #[test]
    fn test_dropped_characters_leave_single_spaces() {
        assert_eq!(sanitize_seller_name("Acme & Co."), "Acme Co");
        assert_eq!(sanitize_seller_name("Foo  Bar"), "Foo Bar");
        assert_eq!(sanitize_reference("RE 1 / 2"), "RE 1 - 2");
    }

    #[test]
    fn test_seller_name_reserved_and_empty() {
        assert_eq!(sanitize_seller_name("con"), "_con");
        assert_eq!(sanitize_seller_name("COM1."), "_COM1");
        assert_eq!(sanitize_seller_name(""), "_");
        assert_eq!(sanitize_seller_name("@@@"), "_");
        assert_eq!(sanitize_seller_name("..."), "_");
    }

    #[test]
    fn test_seller_name_idempotent_and_non_empty() {
        for sample in SAMPLES {
            let once = sanitize_seller_name(sample);
            assert!(!once.is_empty(), "{:?}", sample);
            assert_eq!(sanitize_seller_name(&once), once, "{:?}", sample);
        }
    }

    #[test]
    fn test_reference() {
        assert_eq!(sanitize_reference("RE/2024/001"), "RE-2024-001");
        assert_eq!(sanitize_reference(".hidden."), "hidden");
        assert_eq!(sanitize_reference(""), "_na_ref_");
        assert_eq!(sanitize_reference("nul"), "_nul");
    }

    #[test]
    fn test_reference_idempotent_and_non_empty() {
        for sample in SAMPLES {
            let once = sanitize_reference(sample);
            assert!(!once.is_empty(), "{:?}", sample);
            assert_eq!(sanitize_reference(&once), once, "{:?}", sample);
        }
    }
}
