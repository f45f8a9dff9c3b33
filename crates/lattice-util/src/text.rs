/// Truncate message content for use in a reply preview, keeping whole
/// characters and appending an ellipsis when anything was cut.
pub fn snippet(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim().replace('\n', " ");
    if trimmed.chars().count() <= max_chars {
        return trimmed;
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::snippet;

    #[test]
    fn short_content_is_returned_whole() {
        assert_eq!(snippet("hello", 10), "hello");
    }

    #[test]
    fn long_content_is_cut_with_ellipsis() {
        assert_eq!(snippet("hello there", 5), "hello…");
    }

    #[test]
    fn newlines_are_flattened() {
        assert_eq!(snippet("a\nb", 10), "a b");
    }

    #[test]
    fn multibyte_content_is_cut_on_char_boundaries() {
        assert_eq!(snippet("ééééé", 3), "ééé…");
    }
}
