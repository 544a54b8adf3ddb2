use crate::domain::message::MailMessage;
use regex::Regex;
use std::sync::LazyLock;

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>")
        .expect("script/style regex is valid")
});

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|tr|li|h[1-6]|table)\s*>")
        .expect("block break regex is valid")
});

static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x?)([0-9a-fA-F]+);").expect("entity regex is valid"));

static FORWARD_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)-+\s*forwarded message\s*-+|begin forwarded message|original message")
        .expect("forward marker regex is valid")
});

static FORWARD_SUBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(fwd?|fw)\s*:").expect("forward subject regex is valid"));

static CELL_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</t[dh]\s*>|<t[dh]\b[^>]*>").expect("cell break regex is valid")
});

/// Reduces an HTML body to plain text.
///
/// Inline tags are removed without inserting whitespace so that `<span>12</span><span>.50`
/// stays adjacent; block-level closers become line breaks and table cells are separated
/// by a space.
pub fn flatten_html(html: &str) -> String {
    let without_scripts = SCRIPT_STYLE.replace_all(html, "");
    let with_breaks = BLOCK_BREAK.replace_all(&without_scripts, "\n");
    let with_breaks = CELL_BREAK.replace_all(&with_breaks, " ");

    let mut out = String::with_capacity(with_breaks.len());
    let mut in_tag = false;
    for ch in with_breaks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    let decoded = decode_entities(&out);
    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(input: &str) -> String {
    let named = input
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&dollar;", "$");
    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures<'_>| {
        let radix = if caps[1].is_empty() { 10 } else { 16 };
        u32::from_str_radix(&caps[2], radix)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    // &amp; last so "&amp;lt;" stays literal.
    numeric.replace("&amp;", "&")
}

/// Plain text is preferred; HTML is flattened only when no text part exists.
pub fn body_text(message: &MailMessage) -> String {
    match (&message.text, &message.html) {
        (Some(text), _) if !text.trim().is_empty() => text.clone(),
        (_, Some(html)) => flatten_html(html),
        _ => String::new(),
    }
}

pub fn is_forwarded(message: &MailMessage, body: &str) -> bool {
    FORWARD_SUBJECT.is_match(&message.subject) || FORWARD_MARKER.is_match(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_keeps_split_amount_adjacent() {
        let html = r#"<div><span class="a">$</span><span>12</span><span>.</span><span>50</span></div>"#;
        assert_eq!(flatten_html(html), "$12.50");
    }

    #[test]
    fn test_flatten_drops_style_and_decodes_entities() {
        let html = "<html><head><style>p { color: red; }</style></head>\
                    <body><p>Tom&nbsp;&amp;&nbsp;Jerry</p><p>&#36;5&#x2E;00</p></body></html>";
        assert_eq!(flatten_html(html), "Tom & Jerry\n$5.00");
    }

    #[test]
    fn test_flatten_collapses_whitespace() {
        let html = "<td>\n   Jane    Roe\n</td><br/>paid you";
        assert_eq!(flatten_html(html), "Jane Roe\npaid you");
    }

    #[test]
    fn test_flatten_separates_table_cells() {
        let html = "<table><tr><td>Jane Roe</td><td>paid you</td></tr>\
                    <tr><td>$12.50</td></tr>\
                    <tr><TD class=\"memo\">ORD-1b9d6bcd-bbfd-4b2d-9b5d-ab8dfbbd4bed</TD><th>Note</th></tr></table>";
        assert_eq!(
            flatten_html(html),
            "Jane Roe paid you\n$12.50\nORD-1b9d6bcd-bbfd-4b2d-9b5d-ab8dfbbd4bed Note"
        );
    }

    #[test]
    fn test_forward_detection() {
        let mut msg = MailMessage {
            id: "1".into(),
            from: "me@example.com".into(),
            from_address: "me@example.com".into(),
            subject: "Fwd: Jane Roe paid you $5.00".into(),
            date: None,
            text: None,
            html: None,
            message_id: None,
        };
        assert!(is_forwarded(&msg, ""));
        msg.subject = "hello".into();
        assert!(!is_forwarded(&msg, "plain body"));
        assert!(is_forwarded(&msg, "---------- Forwarded message ---------\nFrom: Venmo"));
    }
}
