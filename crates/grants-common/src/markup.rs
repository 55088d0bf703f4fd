//! Markup-safe text splitting
//!
//! Splits an HTML-bearing string close to a target length without cutting
//! through a tag. The cut is deferred to the first whitespace at or after the
//! target where every opened tag has been closed again.
//!
//! Indices are counted in Unicode scalar values, not bytes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::error::CommonResult;

/// Malformed markup found while scanning for a split point
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    /// `<` seen while a tag was still open, or input ended inside a tag
    #[error("malformed markup: unclosed tag (at char {index})")]
    UnclosedTag { index: usize },

    /// A second `/` inside a closing tag
    #[error("malformed markup: improperly closed tag (at char {index})")]
    ImproperlyClosedTag { index: usize },

    /// A closing tag with no open tag to match
    #[error("malformed markup: tag open/close mismatch (at char {index})")]
    TagMismatch { index: usize },
}

/// Result of [`split_markup`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupSplit {
    pub pre_split: String,
    pub post_split: String,
}

impl MarkupSplit {
    fn whole(markup: &str) -> Self {
        Self {
            pre_split: markup.to_string(),
            post_split: String::new(),
        }
    }

    /// True when the split point was found before the end of the input
    pub fn is_split(&self) -> bool {
        !self.post_split.is_empty()
    }
}

/// Scanner position relative to tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
    Text,
    /// Inside `<...`; `opener` is set only for the char right after `<`
    Tag {
        opener: bool,
        closing: bool,
        slash_pending: bool,
    },
    /// Inside a quoted attribute value
    Quoted {
        quote: char,
        closing: bool,
    },
}

#[derive(Debug)]
struct Scanner {
    depth: usize,
    state: TagState,
}

impl Scanner {
    fn new() -> Self {
        Self {
            depth: 0,
            state: TagState::Text,
        }
    }

    /// Advance over one char. Returns true when `c` is a legal split point.
    fn step(&mut self, index: usize, c: char) -> Result<bool, MarkupError> {
        match self.state {
            TagState::Text => {
                if c == '<' {
                    self.state = TagState::Tag {
                        opener: true,
                        closing: false,
                        slash_pending: false,
                    };
                    return Ok(false);
                }
                Ok(c.is_whitespace() && self.depth == 0)
            }
            TagState::Quoted { quote, closing } => {
                if c == quote {
                    self.state = TagState::Tag {
                        opener: false,
                        closing,
                        slash_pending: false,
                    };
                }
                Ok(false)
            }
            TagState::Tag {
                opener,
                closing,
                slash_pending,
            } => {
                match c {
                    '<' => return Err(MarkupError::UnclosedTag { index }),
                    '"' | '\'' => {
                        self.state = TagState::Quoted { quote: c, closing };
                    }
                    '/' if opener => {
                        self.state = TagState::Tag {
                            opener: false,
                            closing: true,
                            slash_pending: false,
                        };
                    }
                    '/' if closing => {
                        return Err(MarkupError::ImproperlyClosedTag { index })
                    }
                    '/' => {
                        self.state = TagState::Tag {
                            opener: false,
                            closing: false,
                            slash_pending: true,
                        };
                    }
                    '>' => {
                        if closing {
                            self.depth = self
                                .depth
                                .checked_sub(1)
                                .ok_or(MarkupError::TagMismatch { index })?;
                        } else if !slash_pending {
                            // void elements written without a slash stay open
                            self.depth += 1;
                        }
                        self.state = TagState::Text;
                    }
                    _ => {
                        self.state = TagState::Tag {
                            opener: false,
                            closing,
                            slash_pending: false,
                        };
                    }
                }
                Ok(false)
            }
        }
    }

    fn in_tag(&self) -> bool {
        !matches!(self.state, TagState::Text)
    }
}

/// Split `markup` at the first structural word boundary at or after `split_at`.
///
/// The whitespace char that triggers the split starts `post_split`, so
/// `pre_split + post_split` always reproduces the input.
pub fn split_markup(markup: &str, split_at: usize) -> Result<MarkupSplit, MarkupError> {
    if split_at >= markup.chars().count() {
        return Ok(MarkupSplit::whole(markup));
    }

    let mut scanner = Scanner::new();
    let mut last_index = 0;
    for (index, (byte_offset, c)) in markup.char_indices().enumerate() {
        last_index = index;
        let boundary = scanner.step(index, c)?;
        if boundary && index >= split_at {
            return Ok(MarkupSplit {
                pre_split: markup[..byte_offset].to_string(),
                post_split: markup[byte_offset..].to_string(),
            });
        }
    }

    if scanner.in_tag() {
        return Err(MarkupError::UnclosedTag { index: last_index });
    }
    Ok(MarkupSplit::whole(markup))
}

/// Read a markup file and split its contents, ignoring trailing newlines.
pub fn split_markup_file(path: &Path, split_at: usize) -> CommonResult<MarkupSplit> {
    let markup = std::fs::read_to_string(path)?;
    Ok(split_markup(markup.trim_end_matches('\n'), split_at)?)
}

/// Split for display, falling back to the untruncated text on malformed input.
pub fn truncate_markup(markup: &str, split_at: usize) -> String {
    match split_markup(markup, split_at) {
        Ok(split) => split.pre_split,
        Err(e) => {
            tracing::warn!(error = %e, "unsplittable markup, showing full text");
            markup.to_string()
        }
    }
}

/// Index of the first whitespace char at or after `start_at`.
pub fn find_first_whitespace(content: &str, start_at: usize) -> Option<usize> {
    content
        .chars()
        .enumerate()
        .skip(start_at)
        .find(|(_, c)| c.is_whitespace())
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommonError;
    use proptest::prelude::*;

    const GATSBY: &str = "In my younger and more vulnerable years my father gave me some advice that I've been turning over in my mind ever since.";

    fn split(markup: &str, at: usize) -> (String, String) {
        let s = split_markup(markup, at).unwrap();
        (s.pre_split, s.post_split)
    }

    #[test]
    fn test_shorter_than_split_point() {
        assert_eq!(split("Hi!", 10), ("Hi!".to_string(), String::new()));
        assert_eq!(split("Hi!", 3), ("Hi!".to_string(), String::new()));
    }

    #[test]
    fn test_waits_for_whitespace() {
        let (pre, post) = split("Hi! Exceptionally long word.", 6);
        assert_eq!(pre, "Hi! Exceptionally");
        assert_eq!(post, " long word.");

        let (pre, post) = split("Hi! Exceptionally\n    long word.", 6);
        assert_eq!(pre, "Hi! Exceptionally");
        assert_eq!(post, "\n    long word.");
    }

    #[test]
    fn test_plain_text() {
        let (pre, post) = split(GATSBY, 73);
        assert_eq!(
            pre,
            "In my younger and more vulnerable years my father gave me some advice that"
        );
        assert_eq!(post, " I've been turning over in my mind ever since.");
    }

    #[test]
    fn test_simple_tags() {
        let markup = "<div>In my younger and more vulnerable years my father gave me some advice</div> <div>that I've been turning over in my mind ever since.</div>";
        let expected_pre =
            "<div>In my younger and more vulnerable years my father gave me some advice</div>";
        let expected_post = " <div>that I've been turning over in my mind ever since.</div>";

        assert_eq!(split(markup, 55), (expected_pre.into(), expected_post.into()));
        // target lands inside the closing tag name
        assert_eq!(split(markup, 78), (expected_pre.into(), expected_post.into()));
    }

    #[test]
    fn test_nested_tags() {
        let markup = "<div>In <p>my younger</p> and more <p>vulnerable <strong>years my<ul><li>father</li><li>gave</li></ul>me</strong> some </p>advice</div> <div>that I've been turning over <strong>in</strong> my mind ever since.</div>";
        let (pre, post) = split(markup, 75);
        assert_eq!(pre, "<div>In <p>my younger</p> and more <p>vulnerable <strong>years my<ul><li>father</li><li>gave</li></ul>me</strong> some </p>advice</div>");
        assert_eq!(
            post,
            " <div>that I've been turning over <strong>in</strong> my mind ever since.</div>"
        );
    }

    #[test]
    fn test_quoted_attributes_pass_through() {
        let markup = "<div>In <a href='http://things' fake='<<>>>><<//'>my younger</a> and more <p>vulnerable <strong>years my<ul><li>father</li><li>gave</li></ul>me</strong> some </p>advice</div> <div>that I've been turning over <strong>in</strong> my mind ever since.</div>";
        let (pre, post) = split(markup, 75);
        assert!(pre.ends_with("some </p>advice</div>"));
        assert!(pre.starts_with("<div>In <a href='http://things' fake='<<>>>><<//'>"));
        assert_eq!(
            post,
            " <div>that I've been turning over <strong>in</strong> my mind ever since.</div>"
        );
    }

    #[test]
    fn test_defers_past_straddling_tag() {
        let markup = "<p>Hello <b>World</b></p>";
        assert_eq!(split(markup, 7), (markup.to_string(), String::new()));

        let markup = "<p>Hello <b>World</b></p> and more";
        assert_eq!(
            split(markup, 7),
            ("<p>Hello <b>World</b></p>".to_string(), " and more".to_string())
        );
    }

    #[test]
    fn test_self_closing_and_void_elements() {
        let (pre, post) = split("line one<br/> line two", 3);
        assert_eq!(pre, "line");
        assert_eq!(post, " one<br/> line two");

        let (pre, post) = split("one<br/> two three", 4);
        assert_eq!(pre, "one<br/>");
        assert_eq!(post, " two three");

        // a bare <br> never closes, so no boundary is ever reached
        let markup = "one<br> two three";
        assert_eq!(split(markup, 4), (markup.to_string(), String::new()));
    }

    #[test]
    fn test_malformed_markup() {
        assert_eq!(
            split_markup("<div <p>hello</p></div> world", 2),
            Err(MarkupError::UnclosedTag { index: 5 })
        );
        assert_eq!(
            split_markup("<div>x</di/v> y", 1),
            Err(MarkupError::ImproperlyClosedTag { index: 10 })
        );
        assert_eq!(
            split_markup("</div> hello world", 1),
            Err(MarkupError::TagMismatch { index: 5 })
        );
        assert!(matches!(
            split_markup("<div hello world", 2),
            Err(MarkupError::UnclosedTag { .. })
        ));
    }

    #[test]
    fn test_split_markup_file() {
        let dir = std::env::temp_dir().join(format!("grants-common-markup-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("summary.html");
        std::fs::write(&good, "<p>Hello <b>World</b></p> and more\n").unwrap();
        let split = split_markup_file(&good, 7).unwrap();
        assert_eq!(split.pre_split, "<p>Hello <b>World</b></p>");
        assert_eq!(split.post_split, " and more");

        let bad = dir.join("broken.html");
        std::fs::write(&bad, "</div> hello world").unwrap();
        assert!(matches!(
            split_markup_file(&bad, 1),
            Err(CommonError::Markup(MarkupError::TagMismatch { index: 5 }))
        ));

        assert!(matches!(
            split_markup_file(&dir.join("missing.html"), 1),
            Err(CommonError::IoError(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_truncate_falls_back_on_malformed() {
        assert_eq!(truncate_markup("</b> a b c", 1), "</b> a b c");
        assert_eq!(truncate_markup("a b c", 1), "a");
    }

    #[test]
    fn test_find_first_whitespace() {
        assert_eq!(find_first_whitespace("hi there", 0), Some(2));
        assert_eq!(find_first_whitespace("hi there dude", 3), Some(8));
        assert_eq!(find_first_whitespace("hi there\n    dude", 3), Some(8));
        assert_eq!(find_first_whitespace("nospace", 2), None);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let (pre, post) = split("héllo wörld again", 6);
        assert_eq!(pre, "héllo wörld");
        assert_eq!(post, " again");
    }

    fn balanced_markup() -> impl Strategy<Value = String> {
        let word = "[a-z]{1,8}";
        let token = prop_oneof![
            word.prop_map(|w| w),
            Just(" ".to_string()),
            Just("\n".to_string()),
            word.prop_map(|w| format!("<b>{}</b>", w)),
            (word, word).prop_map(|(a, b)| format!("<p class='x'>{} <i>{}</i></p>", a, b)),
        ];
        proptest::collection::vec(token, 0..24).prop_map(|tokens| tokens.concat())
    }

    proptest! {
        #[test]
        fn prop_split_reconstructs_input(markup in balanced_markup(), frac in 0.0f64..=1.0) {
            let len = markup.chars().count();
            let at = (len as f64 * frac) as usize;
            let split = split_markup(&markup, at).unwrap();
            prop_assert_eq!(format!("{}{}", split.pre_split, split.post_split), markup);
        }

        #[test]
        fn prop_split_past_end_is_whole(markup in balanced_markup(), extra in 0usize..10) {
            let at = markup.chars().count() + extra;
            let split = split_markup(&markup, at).unwrap();
            prop_assert_eq!(split.pre_split, markup);
            prop_assert_eq!(split.post_split, "");
        }

        #[test]
        fn prop_unterminated_tag_fails(tag in "[a-z]{1,6}", rest in "[a-z ]{0,20}") {
            let markup = format!("<{} {}", tag, rest);
            prop_assert!(split_markup(&markup, 0).is_err());
        }
    }
}
