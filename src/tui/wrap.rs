#![forbid(unsafe_code)]

/// Line budget used when a card title has no configured limit.
pub const NO_LINE_LIMIT_CAP: usize = 8;

const ELLIPSIS: char = '…';

#[must_use]
pub fn line_cap(max_lines: usize) -> usize {
    if max_lines == 0 { NO_LINE_LIMIT_CAP } else { max_lines }
}

/// Word-wraps `text` into at most `line_cap(max_lines)` lines of `width`
/// characters. Over-long words are cut; overflow ends the last line in `…`.
#[must_use]
pub fn wrap(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    if width == 0 {
        return Vec::new();
    }
    let limit = line_cap(max_lines);

    let mut lines: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;
    for word in text.split_whitespace() {
        let word: String = word.chars().take(width).collect();
        let len = word.chars().count();
        if cur_len > 0 && cur_len + 1 + len > width {
            lines.push(std::mem::take(&mut cur));
            cur_len = 0;
            if lines.len() > limit {
                break;
            }
        }
        if cur_len > 0 {
            cur.push(' ');
            cur_len += 1;
        }
        cur.push_str(&word);
        cur_len += len;
    }
    if cur_len > 0 {
        lines.push(cur);
    }

    if lines.len() > limit {
        lines.truncate(limit);
        if let Some(last) = lines.last_mut() {
            if last.chars().count() >= width {
                last.pop();
            }
            last.push(ELLIPSIS);
        }
    }
    lines
}
