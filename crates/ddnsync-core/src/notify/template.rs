//! `#{tag}` template rendering

use crate::engine::Tags;

/// Replace every `#{tag}` with its value; unknown tags are left as written
pub fn render(template: &str, tags: &Tags) -> String {
    render_with(template, tags, |value| value.to_string())
}

/// Like [`render`], with values percent-encoded for use inside a URL
pub fn render_url(template: &str, tags: &Tags) -> String {
    render_with(template, tags, |value| {
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
    })
}

fn render_with(template: &str, tags: &Tags, encode: impl Fn(&str) -> String) -> String {
    let mut out = template.to_string();
    for (tag, value) in tags {
        let placeholder = format!("#{{{tag}}}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, &encode(value));
        }
    }
    out
}
