#![forbid(unsafe_code)]

use std::sync::LazyLock;

use regex::Regex;

pub const MAX_SLUG_LEN: usize = 50;

static FILE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+)(?:-[^/\\]*)?\.md$").ok());

/// Lowercase ASCII slug of a title, cut back to a word boundary past [`MAX_SLUG_LEN`].
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len().min(MAX_SLUG_LEN * 2));
    let mut pending_dash = false;
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    if out.len() <= MAX_SLUG_LEN {
        return out;
    }
    let cut_mid_word = out.as_bytes()[MAX_SLUG_LEN] != b'-';
    out.truncate(MAX_SLUG_LEN);
    if cut_mid_word && let Some(idx) = out.rfind('-') {
        out.truncate(idx);
    }
    out.trim_end_matches('-').to_owned()
}

#[must_use]
pub fn file_name(id: u32, slug: &str) -> String {
    if slug.is_empty() {
        format!("{id:03}.md")
    } else {
        format!("{id:03}-{slug}.md")
    }
}

#[must_use]
pub fn file_name_for(id: u32, title: &str) -> String {
    file_name(id, &slugify(title))
}

/// Id encoded in a task file name, if the name looks like one.
#[must_use]
pub fn parse_file_id(name: &str) -> Option<u32> {
    let caps = FILE_ID.as_ref()?.captures(name)?;
    caps.get(1)?.as_str().parse().ok()
}
