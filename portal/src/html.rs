/// Extraction helpers over parsed portal pages.
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

static INPUT: Lazy<Selector> = Lazy::new(|| Selector::parse("input[name]").unwrap());

/// Collapse runs of whitespace (including non-breaking spaces) to one space.
fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// True when one of `ancestors`, up to `root`, is a `tag` element.
fn inside<'a>(ancestors: impl Iterator<Item = ElementRef<'a>>, root: ElementRef<'a>, tag: &str) -> bool {
    ancestors
        .take_while(|a| a.id() != root.id())
        .any(|e| e.value().name() == tag)
}

/// Visible text of an element, whitespace collapsed.
pub fn text(element: ElementRef<'_>) -> String {
    collapse(element.text())
}

/// Like [`text`], but without the text of any links.
pub fn text_without_links(element: ElementRef<'_>) -> String {
    collapse(element.descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        (!inside(node.ancestors().filter_map(ElementRef::wrap), element, "a")).then_some(&**text)
    }))
}

/// `<td>` children of a row.
pub fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "td")
        .collect()
}

/// First non-empty link target below `element`.
pub fn first_href(element: ElementRef<'_>) -> Option<String> {
    element
        .select(&LINK)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())
        .map(str::to_string)
}

/// First non-empty link target below `element` that is not nested in a
/// `tag` element.
pub fn first_href_outside(element: ElementRef<'_>, tag: &str) -> Option<String> {
    element
        .select(&LINK)
        .filter(|a| !inside(a.ancestors().filter_map(ElementRef::wrap), element, tag))
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())
        .map(str::to_string)
}

/// Value of the `<input>` named `name` anywhere on the page.
pub fn input_value(page: &str, name: &str) -> Option<String> {
    let document = Html::parse_document(page);
    let value = document
        .select(&INPUT)
        .find(|input| input.value().attr("name") == Some(name))
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string);
    value
}
