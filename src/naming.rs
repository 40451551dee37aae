//! File naming for gallery entries
//!
//! A display name is stored as `<stem>.<ext>`, duplicates as `<stem> (<n>).<ext>`
//! with `n` counting up from 1. The stem is the display name with `%`, `(`, `)`,
//! path separators, characters reserved on common filesystems, control
//! characters and a leading `.` percent-escaped. Since `(` never survives into
//! a stem, the first ` (` of a file name is always the duplicate marker and the
//! display name can be recovered exactly.

/// Separates a stem from its duplicate counter
pub const DELIMITER: &str = " (";

fn needs_escape(c: char, leading: bool) -> bool {
    matches!(
        c,
        '%' | '(' | ')' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'
    ) || c.is_control()
        || (leading && c == '.')
}

/// Escape a display name into a file stem
pub fn encode_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        if needs_escape(c, i == 0) {
            let mut buf = [0u8; 4];
            for b in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", b));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Undo [`encode_stem`]. Malformed escapes are kept literally.
pub fn decode_stem(stem: &str) -> String {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(b) = hex_byte(bytes[i + 1], bytes[i + 2]) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| stem.to_string())
}

fn hex_byte(hi: u8, lo: u8) -> Option<u8> {
    let digit = |c: u8| (c as char).to_digit(16);
    Some((digit(hi)? * 16 + digit(lo)?) as u8)
}

/// File name of the `index`-th enrollment of `name`; index 0 is the plain name
pub fn file_name(name: &str, index: u32, extension: &str) -> String {
    let stem = encode_stem(name);
    if index == 0 {
        format!("{}.{}", stem, extension)
    } else {
        format!("{}{}{}).{}", stem, DELIMITER, index, extension)
    }
}

/// Recover the display name from a gallery file name.
///
/// The extension is everything after the last `.`; the identity is what comes
/// before the first duplicate marker, or the whole stem if there is none.
pub fn identity_of(file_name: &str) -> Option<String> {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => file_name,
    };
    let base = match stem.find(DELIMITER) {
        Some(idx) => &stem[..idx],
        None => stem,
    };
    if base.is_empty() {
        return None;
    }
    Some(decode_stem(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_are_untouched() {
        assert_eq!(file_name("Carol", 0, "png"), "Carol.png");
        assert_eq!(file_name("Carol", 1, "png"), "Carol (1).png");
        assert_eq!(file_name("Jean Luc", 12, "png"), "Jean Luc (12).png");
    }

    #[test]
    fn test_identity_of_plain_and_duplicate() {
        assert_eq!(identity_of("Carol.png").as_deref(), Some("Carol"));
        assert_eq!(identity_of("Carol (3).png").as_deref(), Some("Carol"));
        assert_eq!(identity_of("Jean Luc (1).png").as_deref(), Some("Jean Luc"));
    }

    #[test]
    fn test_foreign_files() {
        // written by something else, still recoverable by the same rule
        assert_eq!(identity_of("Dave (copy).jpg").as_deref(), Some("Dave"));
        assert_eq!(identity_of("README").as_deref(), Some("README"));
        assert_eq!(identity_of(".png"), None);
        assert_eq!(identity_of(" (1).png"), None);
    }

    #[test]
    fn test_escaping() {
        assert_eq!(encode_stem("Bob (2)"), "Bob %282%29");
        assert_eq!(encode_stem("50%"), "50%25");
        assert_eq!(encode_stem("../etc"), "%2E.%2Fetc");
        assert_eq!(encode_stem("a.b"), "a.b");
        assert_eq!(encode_stem("Zoë"), "Zoë");
    }

    #[test]
    fn test_malformed_escapes_survive_decoding() {
        assert_eq!(decode_stem("100%"), "100%");
        assert_eq!(decode_stem("%zz"), "%zz");
        assert_eq!(decode_stem("%4"), "%4");
        assert_eq!(decode_stem("%FF"), "%FF");
    }

    #[test]
    fn test_adversarial_round_trip() {
        let names = [
            "Alice",
            "Bob (2)",
            "Eve (",
            " (1)",
            "(0)",
            "x (y) (z)",
            "100%",
            "%28",
            "a/b\\c",
            ".hidden",
            "..",
            "file.png",
            "tab\there",
            "Zoë",
            "  spaced  ",
        ];
        for name in names {
            for index in 0..4 {
                let file = file_name(name, index, "png");
                assert!(!file.contains('/'), "{:?}", file);
                assert_eq!(identity_of(&file).as_deref(), Some(name), "{:?}", file);
            }
        }
    }
}
