//! Compact JSON shapes for list columns.

use tome_media::models::{Chapter, Identifier};

#[derive(facet::Facet)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub(crate) struct IdentifierProxy {
    #[facet(rename = "k")]
    kind: String,
    #[facet(rename = "v")]
    value: String,
}
impl From<&Identifier> for IdentifierProxy {
    fn from(identifier: &Identifier) -> Self {
        Self {
            kind: identifier.kind.clone(),
            value: identifier.value.clone(),
        }
    }
}
impl From<IdentifierProxy> for Identifier {
    fn from(proxy: IdentifierProxy) -> Self {
        Identifier::new(proxy.kind, proxy.value)
    }
}

/// One chapter in a pre-order walk of the table of contents, with its depth
/// standing in for nesting.
#[derive(facet::Facet)]
#[cfg_attr(test, derive(Debug, PartialEq))]
pub(crate) struct ChapterProxy {
    #[facet(rename = "t")]
    title: String,
    #[facet(rename = "d")]
    depth: u8,
    #[facet(rename = "s", default, skip_serializing_if = Option::is_none)]
    start_seconds: Option<f64>,
    #[facet(rename = "p", default, skip_serializing_if = Option::is_none)]
    start_page: Option<u32>,
    #[facet(rename = "h", default, skip_serializing_if = Option::is_none)]
    href: Option<String>,
}

pub(crate) fn flatten_chapters(chapters: &[Chapter]) -> Vec<ChapterProxy> {
    fn walk(chapters: &[Chapter], depth: u8, out: &mut Vec<ChapterProxy>) {
        for chapter in chapters {
            out.push(ChapterProxy {
                title: chapter.title.clone(),
                depth,
                start_seconds: chapter.start_seconds,
                start_page: chapter.start_page,
                href: chapter.href.clone(),
            });
            walk(&chapter.children, depth.saturating_add(1), out);
        }
    }
    let mut out = Vec::new();
    walk(chapters, 0, &mut out);
    out
}

pub(crate) fn nest_chapters(flat: Vec<ChapterProxy>) -> Vec<Chapter> {
    // Stack of open chapters; each entry's depth equals its index.
    let mut stack: Vec<Chapter> = Vec::new();
    let mut roots = Vec::new();
    fn close(stack: &mut Vec<Chapter>, roots: &mut Vec<Chapter>, depth: usize) {
        while stack.len() > depth {
            let Some(done) = stack.pop() else { break };
            match stack.last_mut() {
                Some(parent) => parent.children.push(done),
                None => roots.push(done),
            }
        }
    }
    for proxy in flat {
        // Clamp malformed jumps in depth to "child of the current chapter".
        let depth = usize::from(proxy.depth).min(stack.len());
        close(&mut stack, &mut roots, depth);
        stack.push(Chapter {
            title: proxy.title,
            start_seconds: proxy.start_seconds,
            start_page: proxy.start_page,
            href: proxy.href,
            children: Vec::new(),
        });
    }
    close(&mut stack, &mut roots, 0);
    roots
}
