use std::collections::BTreeMap;
use std::fmt;

/// Snapshot of a DOM element (or any UI widget) as seen by the auto-instrumentation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ElementDescriptor {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
}

impl ElementDescriptor {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.clone(),
            "class" if !self.classes.is_empty() => Some(self.classes.join(" ")),
            _ => self.attributes.get(name).cloned(),
        }
    }

    pub fn input_type(&self) -> Option<String> {
        self.attributes
            .get("type")
            .map(|value| value.to_ascii_lowercase())
    }

    pub fn is_password(&self) -> bool {
        self.input_type().as_deref() == Some("password")
    }

    /// Human-readable name: `name`, then `aria-label`, then visible text.
    pub fn display_name(&self) -> Option<String> {
        self.attributes
            .get("name")
            .or_else(|| self.attributes.get("aria-label"))
            .cloned()
            .or_else(|| {
                self.text
                    .as_deref()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(|text| text.chars().take(100).collect())
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum AttributeTest {
    Present(String),
    Equals(String, String),
}

/// One compound selector: `tag#id.class[attr][attr=value]`, every part optional.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    source: String,
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeTest>,
}

impl Selector {
    /// Parses a compound selector. Combinators and pseudo-classes are not supported.
    pub fn parse(source: &str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }
        let mut selector = Selector {
            source: source.to_string(),
            tag: None,
            id: None,
            classes: Vec::new(),
            attributes: Vec::new(),
        };

        let mut chars = source.chars().peekable();
        let tag: String = std::iter::from_fn(|| chars.next_if(|c| is_ident_char(*c) || *c == '*'))
            .collect();
        if !tag.is_empty() && tag != "*" {
            selector.tag = Some(tag.to_ascii_lowercase());
        }

        while let Some(marker) = chars.next() {
            match marker {
                '#' | '.' => {
                    let name: String =
                        std::iter::from_fn(|| chars.next_if(|c| is_ident_char(*c))).collect();
                    if name.is_empty() {
                        return None;
                    }
                    if marker == '#' {
                        selector.id = Some(name);
                    } else {
                        selector.classes.push(name);
                    }
                }
                '[' => {
                    let body: String = std::iter::from_fn(|| chars.next_if(|c| *c != ']')).collect();
                    chars.next()?;
                    selector.attributes.push(parse_attribute(&body)?);
                }
                _ => return None,
            }
        }
        Some(selector)
    }

    pub fn matches(&self, element: &ElementDescriptor) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self
            .classes
            .iter()
            .all(|class| element.classes.iter().any(|own| own == class))
        {
            return false;
        }
        self.attributes.iter().all(|test| match test {
            AttributeTest::Present(name) => element.attribute(name).is_some(),
            AttributeTest::Equals(name, value) => {
                element.attribute(name).as_deref() == Some(value.as_str())
            }
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn parse_attribute(body: &str) -> Option<AttributeTest> {
    match body.split_once('=') {
        None => {
            let name = body.trim();
            (!name.is_empty()).then(|| AttributeTest::Present(name.to_ascii_lowercase()))
        }
        Some((name, value)) => {
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some(AttributeTest::Equals(
                name.to_ascii_lowercase(),
                value.to_string(),
            ))
        }
    }
}

/// Comma-separated selector groups. Unparseable entries are skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<Selector>,
}

impl SelectorList {
    pub fn parse<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selectors = Vec::new();
        for source in sources {
            for part in source.as_ref().split(',') {
                match Selector::parse(part) {
                    Some(selector) => selectors.push(selector),
                    None if part.trim().is_empty() => {}
                    None => log::debug!("ignoring unsupported selector '{}'", part.trim()),
                }
            }
        }
        Self { selectors }
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn matches(&self, element: &ElementDescriptor) -> bool {
        self.selectors.iter().any(|selector| selector.matches(element))
    }
}

/// Path exclusion: `/admin` covers `/admin` and `/admin/...`; a trailing `*` is a plain prefix.
pub fn path_excluded(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|pattern| {
        if let Some(prefix) = pattern.strip_suffix('*') {
            return path.starts_with(prefix);
        }
        let pattern = pattern.trim_end_matches('/');
        if pattern.is_empty() {
            return path == "/" || path.is_empty();
        }
        path == pattern
            || path
                .strip_prefix(pattern)
                .map_or(false, |rest| rest.starts_with('/') || rest.starts_with('?'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CLICK_SELECTORS;

    fn button() -> ElementDescriptor {
        ElementDescriptor::new("BUTTON")
            .with_id("save")
            .with_class("btn")
            .with_class("primary")
            .with_text("  Save changes ")
    }

    #[test]
    fn compound_selectors() {
        let element = button();
        for source in ["button", "#save", ".btn.primary", "button#save.btn", "*", "[id=save]"] {
            assert!(Selector::parse(source).unwrap().matches(&element), "{source}");
        }
        for source in ["a", "#other", ".btn.secondary", "[data-track]"] {
            assert!(!Selector::parse(source).unwrap().matches(&element), "{source}");
        }
    }

    #[test]
    fn attribute_selectors() {
        let link = ElementDescriptor::new("div")
            .with_attribute("role", "button")
            .with_attribute("data-track", "");
        assert!(Selector::parse("[role=button]").unwrap().matches(&link));
        assert!(Selector::parse("[role='button']").unwrap().matches(&link));
        assert!(Selector::parse("div[data-track]").unwrap().matches(&link));
        assert!(!Selector::parse("[role=link]").unwrap().matches(&link));
    }

    #[test]
    fn default_click_allow_list() {
        let list = SelectorList::parse(DEFAULT_CLICK_SELECTORS);
        assert!(list.matches(&button()));
        assert!(list.matches(&ElementDescriptor::new("a")));
        assert!(list.matches(&ElementDescriptor::new("span").with_attribute("role", "button")));
        assert!(!list.matches(&ElementDescriptor::new("span")));
    }

    #[test]
    fn unsupported_syntax_is_skipped() {
        let list = SelectorList::parse(["form input, .ok", "a:hover", "[broken"]);
        assert!(list.matches(&ElementDescriptor::new("p").with_class("ok")));
        assert!(!list.matches(&ElementDescriptor::new("input")));
        assert!(!list.matches(&ElementDescriptor::new("a")));
    }

    #[test]
    fn display_name_prefers_name_attribute() {
        assert_eq!(button().display_name().as_deref(), Some("Save changes"));
        let named = button().with_attribute("name", "save-form");
        assert_eq!(named.display_name().as_deref(), Some("save-form"));
    }

    #[test]
    fn path_patterns() {
        let patterns = vec!["/admin".to_string(), "/internal/*".to_string()];
        assert!(path_excluded(&patterns, "/admin"));
        assert!(path_excluded(&patterns, "/admin/users"));
        assert!(!path_excluded(&patterns, "/administrator"));
        assert!(path_excluded(&patterns, "/internal/debug"));
        assert!(!path_excluded(&patterns, "/cart"));
    }
}
