/// Turn an underscore-delimited column key into a display title.
///
/// Each word gets its first character upper-cased; the rest of the word is
/// left untouched (`school_status` -> `School Status`).
pub fn make_title(key: &str) -> String {
    key.split('_')
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_title_two_words() {
        assert_eq!(make_title("school_status"), "School Status");
    }

    #[test]
    fn test_make_title_empty() {
        assert_eq!(make_title(""), "");
    }

    #[test]
    fn test_make_title_single_letters() {
        assert_eq!(make_title("a_b_c"), "A B C");
    }

    #[test]
    fn test_make_title_keeps_inner_case() {
        assert_eq!(make_title("num_HH_members"), "Num HH Members");
        assert_eq!(make_title("age"), "Age");
    }

    #[test]
    fn test_make_title_consecutive_underscores() {
        // Empty words survive as empty segments
        assert_eq!(make_title("a__b"), "A  B");
        assert_eq!(make_title("_private"), " Private");
    }
}
