/// Separator between DokuWiki namespace segments.
pub const NAMESPACE_SEPARATOR: char = ':';

const SEPARATOR_CHARS: &[char] = &[
    '･', '・', '(', ')', '（', '）', '[', ']', '［', '］', '{', '}', '「', '」', '『', '』',
    '【', '】', '〈', '〉', '《', '》', '、', '。', '，', '．', '！', '？', '：', '；', '!', '?',
    ',', ';', '&', '\'', '"', '/', '\\', '|', '#', '+', '*', '<', '>', '~', '`', '　',
];

/// Map a wiki page or media reference to its canonical key.
///
/// `team:Sub Page` and `:team::sub_page` both become `team_sub_page`. The
/// result may be empty for degenerate input; callers treat that as a miss.
/// It never starts with `.`, since it also names a staged file.
pub fn normalize(reference: &str) -> String {
    let joined = reference
        .split(NAMESPACE_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    let mut output = String::with_capacity(joined.len());
    let mut pending_separator = false;
    for ch in joined.chars() {
        if ch == '_' || ch.is_whitespace() || SEPARATOR_CHARS.contains(&ch) {
            pending_separator = true;
            continue;
        }
        if ch == '.' && output.is_empty() {
            continue;
        }
        if pending_separator && !output.is_empty() {
            output.push('_');
        }
        pending_separator = false;
        output.extend(ch.to_lowercase());
    }
    output
}

/// Display title for a page link without an explicit title: the last
/// non-empty namespace segment.
pub fn link_target_title(target: &str) -> &str {
    target
        .rsplit(NAMESPACE_SEPARATOR)
        .map(str::trim)
        .find(|segment| !segment.is_empty())
        .unwrap_or("")
}
