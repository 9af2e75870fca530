use crate::error::Error;
use crate::extract::ElementCapture;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Element kind a link was discovered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// An `<a>` element.
    Anchor,
    /// A `<form>` element.
    Form,
    /// Anything else carrying a click handler.
    Clickable,
}

impl Tag {
    pub fn from_name(name: &str) -> Self {
        match name {
            "a" => Tag::Anchor,
            "form" => Tag::Form,
            _ => Tag::Clickable,
        }
    }
}

/// HTTP method of the action. Defaults to GET when the element does not
/// say otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn from_attr(attr: &str) -> Self {
        if attr.eq_ignore_ascii_case("post") {
            Method::Post
        } else {
            Method::Get
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One discovered navigable or submittable action.
///
/// Identity for exact deduplication is full-field structural equality.
/// `to` is `None` when the element had no resolvable target; such a link
/// is recorded but never traversed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub from: Url,
    pub to: Option<Url>,
    #[serde(default)]
    pub attr_id: String,
    #[serde(default)]
    pub attr_onclick: String,
    #[serde(default)]
    pub text: String,
    pub tag: Tag,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub selector: String,
}

impl Link {
    /// Build a link from a captured page element.
    ///
    /// The target is the element's `action` attribute if present, else its
    /// `href`; an empty target yields a degenerate link rather than an
    /// error. A target that cannot be resolved against the source page is
    /// an [`Error::InvalidUrl`].
    pub fn from_capture(from: &Url, cap: &ElementCapture, selector: &str) -> Result<Link, Error> {
        let raw_to = if !cap.action.is_empty() {
            cap.action.trim()
        } else {
            cap.href.trim()
        };
        let to = if raw_to.is_empty() {
            None
        } else {
            Some(from.join(raw_to).map_err(|source| Error::InvalidUrl {
                raw: raw_to.to_string(),
                source,
            })?)
        };

        let tag = Tag::from_name(&cap.tag);
        Ok(Link {
            from: from.clone(),
            to,
            attr_id: cap.id.clone(),
            attr_onclick: cap.onclick.clone(),
            text: link_text(tag, cap),
            tag,
            method: Method::from_attr(&cap.method),
            selector: selector.to_string(),
        })
    }

    /// Whether the action points back at its own page, e.g. `href="#"`.
    pub fn is_self_loop(&self) -> bool {
        self.to.as_ref() == Some(&self.from)
    }

    /// Whether the target uses the inline-script pseudo-scheme. Such
    /// links are kept for auditing but never traversed.
    pub fn is_inline_script(&self) -> bool {
        self.to
            .as_ref()
            .is_some_and(|to| to.scheme() == "javascript")
    }

    /// Similarity used for summarization: endpoints pairwise similar and
    /// an exact match on the click handler.
    pub fn similar_to(&self, other: &Link) -> bool {
        similar_url(&self.from, &other.from)
            && similar_target(self.to.as_ref(), other.to.as_ref())
            && self.attr_onclick == other.attr_onclick
    }
}

/// Best-effort human label. A form's best label is usually its submit
/// control, not its tag name.
fn link_text(tag: Tag, cap: &ElementCapture) -> String {
    if tag != Tag::Form {
        return cap.text.clone();
    }
    if !cap.name.is_empty() {
        return cap.name.clone();
    }
    for control in &cap.controls {
        if !control.is_button_like() {
            continue;
        }
        if !control.value.is_empty() {
            return control.value.clone();
        }
        if !control.alt.is_empty() {
            return control.alt.clone();
        }
        if !control.name.is_empty() {
            return control.name.clone();
        }
    }
    cap.text.clone()
}

/// Two URLs are similar iff host and path are identical and their query
/// parameter key sets are identical. Parameter values are ignored.
pub fn similar_url(a: &Url, b: &Url) -> bool {
    if a.host_str() != b.host_str() || a.port() != b.port() || a.path() != b.path() {
        return false;
    }
    let keys = |u: &Url| -> HashSet<String> {
        u.query_pairs().map(|(k, _)| k.into_owned()).collect()
    };
    keys(a) == keys(b)
}

/// Similarity lifted over degenerate targets: two absent targets are
/// similar, an absent and a present one are not.
pub fn similar_target(a: Option<&Url>, b: Option<&Url>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => similar_url(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::InputControl;

    fn capture(tag: &str) -> ElementCapture {
        ElementCapture {
            tag: tag.to_string(),
            ..ElementCapture::default()
        }
    }

    fn page() -> Url {
        Url::parse("http://example.com/list").unwrap()
    }

    #[test]
    fn anchor_target_comes_from_href() {
        let mut cap = capture("a");
        cap.href = "/detail?id=1".to_string();
        cap.text = "Detail".to_string();

        let link = Link::from_capture(&page(), &cap, "a[href]").unwrap();
        assert_eq!(
            link.to.as_ref().map(Url::as_str),
            Some("http://example.com/detail?id=1")
        );
        assert_eq!(link.tag, Tag::Anchor);
        assert_eq!(link.method, Method::Get);
        assert_eq!(link.text, "Detail");
    }

    #[test]
    fn form_action_takes_precedence_over_href() {
        let mut cap = capture("form");
        cap.href = "/ignored".to_string();
        cap.action = "/search".to_string();
        cap.method = "post".to_string();

        let link = Link::from_capture(&page(), &cap, "form").unwrap();
        assert_eq!(
            link.to.as_ref().map(Url::as_str),
            Some("http://example.com/search")
        );
        assert_eq!(link.method, Method::Post);
    }

    #[test]
    fn empty_target_is_degenerate_not_an_error() {
        let cap = capture("div");
        let link = Link::from_capture(&page(), &cap, "[onclick]").unwrap();
        assert!(link.to.is_none());
        assert!(!link.is_self_loop());
        assert!(!link.is_inline_script());
    }

    #[test]
    fn form_text_prefers_name_attribute() {
        let mut cap = capture("form");
        cap.name = "login".to_string();
        cap.controls.push(InputControl {
            element: "input".to_string(),
            ctype: "submit".to_string(),
            value: "Go".to_string(),
            ..InputControl::default()
        });

        let link = Link::from_capture(&page(), &cap, "form").unwrap();
        assert_eq!(link.text, "login");
    }

    #[test]
    fn form_text_falls_back_to_first_button_control() {
        let mut cap = capture("form");
        cap.text = "whole form text".to_string();
        cap.controls.push(InputControl {
            element: "input".to_string(),
            ctype: "text".to_string(),
            name: "q".to_string(),
            value: "typed".to_string(),
            ..InputControl::default()
        });
        cap.controls.push(InputControl {
            element: "input".to_string(),
            ctype: "image".to_string(),
            alt: "Search".to_string(),
            ..InputControl::default()
        });
        cap.controls.push(InputControl {
            element: "input".to_string(),
            ctype: "submit".to_string(),
            value: "Later".to_string(),
            ..InputControl::default()
        });

        let link = Link::from_capture(&page(), &cap, "form").unwrap();
        // First button-like control wins; the text input is not a button.
        assert_eq!(link.text, "Search");
    }

    #[test]
    fn self_loop_and_inline_script_flags() {
        let mut cap = capture("a");
        cap.href = "http://example.com/list".to_string();
        let link = Link::from_capture(&page(), &cap, "a[href]").unwrap();
        assert!(link.is_self_loop());

        let mut cap = capture("a");
        cap.href = "javascript:void(0)".to_string();
        let link = Link::from_capture(&page(), &cap, "a[href]").unwrap();
        assert!(link.is_inline_script());
    }

    #[test]
    fn similar_urls_ignore_query_values_but_not_keys_or_path() {
        let a = Url::parse("http://x/?a=1").unwrap();
        let b = Url::parse("http://x/?a=2").unwrap();
        let c = Url::parse("http://x/p?a=1").unwrap();
        let d = Url::parse("http://x/?b=1").unwrap();

        assert!(similar_url(&a, &b));
        assert!(!similar_url(&a, &c));
        assert!(!similar_url(&a, &d));
    }

    #[test]
    fn similarity_distinguishes_onclick_handlers() {
        let mut cap = capture("a");
        cap.href = "/next".to_string();
        let plain = Link::from_capture(&page(), &cap, "a[href]").unwrap();
        let mut scripted = plain.clone();
        scripted.attr_onclick = "f()".to_string();

        assert!(!plain.similar_to(&scripted));
        assert!(plain.similar_to(&plain.clone()));
    }
}
