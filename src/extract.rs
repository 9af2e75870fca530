use crate::error::Error;
use scraper::{ElementRef, Html, Selector};

/// Input control types that act as a form's submit button.
const BUTTON_TYPES: [&str; 4] = ["submit", "image", "reset", "button"];

/// A descendant input control of a captured form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputControl {
    /// Element name, `input` or `button`.
    pub element: String,
    /// The `type` attribute, empty if absent.
    pub ctype: String,
    pub name: String,
    pub value: String,
    pub alt: String,
}

impl InputControl {
    /// Whether this control submits its form rather than carrying data.
    pub fn is_button_like(&self) -> bool {
        self.element == "button" || BUTTON_TYPES.contains(&self.ctype.as_str())
    }
}

/// Raw attributes and text of one element matched by the link selector.
#[derive(Debug, Clone, Default)]
pub struct ElementCapture {
    pub tag: String,
    pub id: String,
    pub onclick: String,
    pub href: String,
    pub action: String,
    pub method: String,
    pub name: String,
    pub text: String,
    pub controls: Vec<InputControl>,
}

/// Compile the configured link selector, failing with a configuration
/// error on invalid syntax.
pub fn parse_selector(selector: &str) -> Result<Selector, Error> {
    Selector::parse(selector)
        .map_err(|e| Error::Config(format!("invalid link selector {selector:?}: {e}")))
}

/// Extract every actionable element matched by `selector` from a page.
///
/// Forms also capture their descendant input controls so that submit
/// labels and POST payloads can be derived later.
pub fn extract_actions(html: &str, selector: &Selector) -> Vec<ElementCapture> {
    let doc = Html::parse_document(html);
    let controls_selector =
        Selector::parse("input,button").expect("static control selector is valid");

    let captures: Vec<ElementCapture> = doc
        .select(selector)
        .map(|el| capture_element(el, &controls_selector))
        .collect();

    ::log::debug!("extracted {} actionable elements", captures.len());
    captures
}

fn capture_element(el: ElementRef<'_>, controls_selector: &Selector) -> ElementCapture {
    let attr = |name: &str| el.value().attr(name).unwrap_or_default().to_string();
    let tag = el.value().name().to_string();

    let controls = if tag == "form" {
        el.select(controls_selector)
            .map(|c| InputControl {
                element: c.value().name().to_string(),
                ctype: c.value().attr("type").unwrap_or_default().to_string(),
                name: c.value().attr("name").unwrap_or_default().to_string(),
                value: c.value().attr("value").unwrap_or_default().to_string(),
                alt: c.value().attr("alt").unwrap_or_default().to_string(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ElementCapture {
        id: attr("id"),
        onclick: attr("onclick"),
        href: attr("href"),
        action: attr("action"),
        method: attr("method"),
        name: attr("name"),
        text: element_text(el),
        tag,
        controls,
    }
}

/// Collapse an element's text nodes into single-spaced visible text.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(|t| t.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_SELECTOR: &str = "a[href], form, [onclick]";

    fn extract(html: &str) -> Vec<ElementCapture> {
        let selector = parse_selector(DEFAULT_SELECTOR).unwrap();
        extract_actions(html, &selector)
    }

    #[test]
    fn captures_anchors_forms_and_click_handlers() {
        let html = r#"
            <body>
              <a href="/one">First   link</a>
              <form action="/submit" method="POST" name="f">
                <input type="text" name="q" value="x">
                <input type="submit" value="Send">
              </form>
              <div onclick="go()" id="clicky">press</div>
              <a>no href, not matched</a>
            </body>"#;

        let captures = extract(html);
        assert_eq!(captures.len(), 3);

        let anchor = &captures[0];
        assert_eq!(anchor.tag, "a");
        assert_eq!(anchor.href, "/one");
        assert_eq!(anchor.text, "First link");

        let form = &captures[1];
        assert_eq!(form.tag, "form");
        assert_eq!(form.action, "/submit");
        assert_eq!(form.method, "POST");
        assert_eq!(form.name, "f");
        assert_eq!(form.controls.len(), 2);
        assert!(!form.controls[0].is_button_like());
        assert!(form.controls[1].is_button_like());

        let div = &captures[2];
        assert_eq!(div.tag, "div");
        assert_eq!(div.onclick, "go()");
        assert_eq!(div.id, "clicky");
    }

    #[test]
    fn button_elements_count_as_buttons() {
        let html = r#"<form action="/go"><button name="ok">OK</button></form>"#;
        let captures = extract(html);
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].controls.len(), 1);
        assert!(captures[0].controls[0].is_button_like());
        assert_eq!(captures[0].controls[0].name, "ok");
    }

    #[test]
    fn rejects_invalid_selector() {
        assert!(parse_selector("a[").is_err());
    }

    #[test]
    fn controls_are_only_collected_for_forms() {
        let html = r#"<div onclick="x()"><input type="text" name="n"></div>"#;
        let captures = extract(html);
        assert_eq!(captures.len(), 1);
        assert!(captures[0].controls.is_empty());
    }
}
