//! Minimal HTML-to-text stripping for chunked web content.
//!
//! Keeps `<a>` and `<img>` tags (links and images stay addressable for
//! the model), drops everything else including script/style bodies,
//! decodes the common entities, and collapses whitespace.

/// Entities decoded by [`strip_html`]. Anything else passes through.
const ENTITIES: &[(&str, &str, &str)] = &[
    // (named, numeric, replacement)
    ("nbsp", "#160", " "),
    ("amp", "#38", "&"),
    ("lt", "#60", "<"),
    ("gt", "#62", ">"),
    ("quot", "#34", "\""),
    ("apos", "#39", "'"),
    ("mdash", "#8212", "--"),
    ("ndash", "#8211", "-"),
    ("hellip", "#8230", "..."),
    ("laquo", "#171", "<<"),
    ("raquo", "#187", ">>"),
];

/// Strip HTML tags from `html`, preserving `<a>`/`<img>` tags, decoding
/// common entities, skipping script/style content, and collapsing runs
/// of whitespace into single spaces.
pub fn strip_html(html: &str) -> String {
    let chars: Vec<char> = html.chars().collect();
    let mut result = String::with_capacity(html.len());

    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut keep_tag = false;
    let mut tag_buffer = String::new();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if c == '<' {
            in_tag = true;
            tag_buffer.clear();
            tag_buffer.push('<');

            // Peek ahead to identify the tag name
            let mut peek = String::new();
            for &pc in chars.iter().skip(i + 1).take(11) {
                if pc == ' ' || pc == '>' || pc == '\t' || pc == '\n' {
                    break;
                }
                peek.extend(pc.to_lowercase());
            }

            if peek.starts_with("script") {
                in_script = true;
            } else if peek == "/script" {
                in_script = false;
            } else if peek.starts_with("style") {
                in_style = true;
            } else if peek == "/style" {
                in_style = false;
            }

            keep_tag = matches!(peek.as_str(), "a" | "img" | "/a" | "/img");
        } else if c == '>' && in_tag {
            tag_buffer.push(c);
            in_tag = false;

            if keep_tag && !in_script && !in_style {
                result.push_str(&tag_buffer);
            } else if !in_script && !in_style {
                // Tag boundaries become separators
                result.push(' ');
            }

            tag_buffer.clear();
            keep_tag = false;
        } else if in_tag {
            tag_buffer.push(c);
        } else if !in_script && !in_style {
            if c == '&'
                && let Some((decoded, consumed)) = decode_entity(&chars[i..])
            {
                result.push_str(decoded);
                i += consumed;
                continue;
            }
            result.push(c);
        }

        i += 1;
    }

    normalize_whitespace(&result)
}

/// Try to decode an entity starting at `&`. Returns the replacement
/// and how many chars (including `&` and `;`) were consumed.
fn decode_entity(chars: &[char]) -> Option<(&'static str, usize)> {
    let mut name = String::new();
    let mut j = 1;
    while j < chars.len() && j < 10 && chars[j] != ';' && chars[j] != ' ' {
        name.push(chars[j]);
        j += 1;
    }
    if j >= chars.len() || chars[j] != ';' {
        return None;
    }

    ENTITIES
        .iter()
        .find(|(named, numeric, _)| name == *named || name == *numeric)
        .map(|(_, _, replacement)| (*replacement, j + 1))
}

/// Collapse whitespace runs into single spaces, trimming both ends.
pub fn normalize_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_space = true;

    for c in s.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            result.push(c);
            last_was_space = false;
        }
    }

    if result.ends_with(' ') {
        result.pop();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plain_tags() {
        assert_eq!(
            strip_html("<p>Hello <b>world</b></p>"),
            "Hello world"
        );
    }

    #[test]
    fn preserves_links_and_images() {
        let out = strip_html(r#"<div><a href="/x">link</a> and <img src="y.png"></div>"#);
        assert!(out.contains(r#"<a href="/x">link</a>"#));
        assert!(out.contains(r#"<img src="y.png">"#));
        assert!(!out.contains("<div>"));
    }

    #[test]
    fn drops_script_and_style_bodies() {
        let out = strip_html("<p>keep</p><script>var x = 1;</script><style>.a{}</style><p>this</p>");
        assert_eq!(out, "keep this");
    }

    #[test]
    fn decodes_common_entities() {
        assert_eq!(strip_html("a &amp; b &lt;c&gt; &nbsp;d"), "a & b <c> d");
        assert_eq!(strip_html("&quot;x&quot; &#39;y&#39;"), "\"x\" 'y'");
        assert_eq!(strip_html("wait&hellip;"), "wait...");
    }

    #[test]
    fn unknown_entities_pass_through() {
        assert_eq!(strip_html("&bogus; stays"), "&bogus; stays");
    }

    #[test]
    fn normalize_collapses_runs() {
        assert_eq!(normalize_whitespace("  a \n\t b   c  "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }
}
