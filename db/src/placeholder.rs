//! Positional placeholder handling.
//!
//! Callers always write `?` markers. The networked engine expects `$1..$n`,
//! so [`to_numbered`] rewrites markers left to right. Text inside single
//! quotes (string literals) and double quotes (quoted identifiers) is copied
//! verbatim; a doubled quote inside either is treated as an escaped quote.
//! Comments are not recognized, so a `?` inside a comment still counts.

use std::borrow::Cow;

/// Number of `?` markers outside quoted sections.
pub fn count(sql: &str) -> usize {
    let mut markers = 0;
    scan(sql, |segment| {
        if let Segment::Marker = segment {
            markers += 1;
        }
    });
    markers
}

/// Rewrite `?` markers to `$1, $2, …` in order of appearance.
pub fn to_numbered(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = 1usize;
    scan(sql, |segment| match segment {
        Segment::Text(text) => out.push_str(text),
        Segment::Marker => {
            out.push('$');
            out.push_str(&next.to_string());
            next += 1;
        }
    });
    Cow::Owned(out)
}

enum Segment<'a> {
    Text(&'a str),
    Marker,
}

fn scan<'a>(sql: &'a str, mut visit: impl FnMut(Segment<'a>)) {
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in sql.char_indices() {
        match quote {
            // '' and "" close and immediately reopen the quoted section.
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '?' => {
                visit(Segment::Text(&sql[start..i]));
                visit(Segment::Marker);
                start = i + 1;
            }
            None => {}
        }
    }
    visit(Segment::Text(&sql[start..]));
}
