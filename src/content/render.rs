use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use comrak::options::{ListStyleType, Options};
use comrak::{Arena, format_html, parse_document};
use lol_html::{RewriteStrSettings, element, rewrite_str, text};
use once_cell::sync::Lazy;
use pinyin::ToPinyin;
use thiserror::Error;

use crate::cache::content_digest;
use crate::domain::articles::Heading;

const HEADING_SELECTOR: &str = "h1, h2, h3, h4, h5, h6";
const MERMAID_ID_LEN: usize = 8;
const INTERNAL_LINK_PREFIXES: [&str; 2] = ["/blog/article/", "article/"];
const INTERNAL_LINK_CLASS: &str = "internal-article-link";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("html post-processing failed: {message}")]
    Document { message: String },
}

/// Comrak pipeline for article bodies.
///
/// Headings get stable `id` anchors, Mermaid fences become
/// `<div class="mermaid">` blocks for client-side rendering, and links to
/// other articles are tagged for in-app navigation.
pub struct MarkdownRenderer {
    options: Options<'static>,
}

static RENDERER: Lazy<MarkdownRenderer> = Lazy::new(MarkdownRenderer::new);

/// Shared renderer instance, built on first use.
pub fn renderer() -> &'static MarkdownRenderer {
    &RENDERER
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let mut options = Options::default();

        let ext = &mut options.extension;
        ext.strikethrough = true;
        ext.table = true;
        ext.autolink = true;
        ext.tasklist = true;
        ext.footnotes = true;
        ext.description_lists = true;
        ext.front_matter_delimiter = Some("---".to_string());

        let render = &mut options.render;
        render.github_pre_lang = true;
        render.list_style = ListStyleType::Dash;
        render.r#unsafe = true;

        Self { options }
    }

    pub fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        let anchors = rewrite_ast(root);

        let mut html = String::new();
        format_html(root, &self.options, &mut html).map_err(|err| RenderError::Markdown {
            message: err.to_string(),
        })?;

        post_process(&html, &anchors)
    }
}

struct HeadingAnchor {
    level: u8,
    anchor: String,
}

fn rewrite_ast<'a>(root: &'a AstNode<'a>) -> Vec<HeadingAnchor> {
    let mut anchors = Vec::new();
    let mut slugger = AnchorSlugger::default();
    visit(root, &mut anchors, &mut slugger);
    anchors
}

fn visit(node: &AstNode<'_>, anchors: &mut Vec<HeadingAnchor>, slugger: &mut AnchorSlugger) {
    if let Some(level) = heading_level(node) {
        let text = collect_inline_text(node);
        anchors.push(HeadingAnchor {
            level,
            anchor: slugger.anchor_for(&text),
        });
    }

    if let Some(html) = mermaid_block(node) {
        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
    }

    let mut child = node.first_child();
    while let Some(next) = child {
        visit(next, anchors, slugger);
        child = next.next_sibling();
    }
}

fn heading_level(node: &AstNode<'_>) -> Option<u8> {
    let data = node.data.borrow();
    if let NodeValue::Heading(heading) = &data.value {
        Some(heading.level)
    } else {
        None
    }
}

fn mermaid_block(node: &AstNode<'_>) -> Option<String> {
    let data = node.data.borrow();
    let NodeValue::CodeBlock(block) = &data.value else {
        return None;
    };
    let language = block.info.split_whitespace().next()?;
    if !language.eq_ignore_ascii_case("mermaid") {
        return None;
    }

    let code = block.literal.trim();
    let mut id = content_digest(code);
    id.truncate(MERMAID_ID_LEN);
    Some(format!(
        "<div class=\"mermaid\" id=\"mermaid-{id}\">\n{}\n</div>\n",
        escape_html(code)
    ))
}

fn collect_inline_text(node: &AstNode<'_>) -> String {
    fn walk(node: &AstNode<'_>, buffer: &mut String) {
        {
            let data = node.data.borrow();
            match &data.value {
                NodeValue::Text(text) => buffer.push_str(text),
                NodeValue::Code(code) => buffer.push_str(&code.literal),
                NodeValue::LineBreak | NodeValue::SoftBreak => buffer.push(' '),
                _ => {}
            }
        }
        let mut child = node.first_child();
        while let Some(next) = child {
            walk(next, buffer);
            child = next.next_sibling();
        }
    }

    let mut text = String::new();
    let mut child = node.first_child();
    while let Some(next) = child {
        walk(next, &mut text);
        child = next.next_sibling();
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Anchors unique within one document: `intro`, `intro-2`, ...
/// Chinese headings are transliterated to pinyin first.
#[derive(Default)]
struct AnchorSlugger {
    seen: HashMap<String, usize>,
    untitled: usize,
}

impl AnchorSlugger {
    fn anchor_for(&mut self, heading: &str) -> String {
        let base = slug::slugify(transliterate(heading));
        let base = if base.is_empty() {
            self.untitled += 1;
            format!("section-{}", self.untitled)
        } else {
            base
        };

        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}-{count}")
        }
    }
}

fn transliterate(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch.to_pinyin() {
            Some(py) => {
                if !output.is_empty() && !output.ends_with(' ') {
                    output.push(' ');
                }
                output.push_str(py.plain());
                output.push(' ');
            }
            None => output.push(ch),
        }
    }
    output
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Article id targeted by an in-site article link, if `href` is one.
fn internal_article_id(href: &str) -> Option<&str> {
    INTERNAL_LINK_PREFIXES
        .iter()
        .find_map(|prefix| href.strip_prefix(prefix))
        .map(|id| id.trim_end_matches('/'))
        .filter(|id| !id.is_empty())
}

fn post_process(html: &str, anchors: &[HeadingAnchor]) -> Result<String, RenderError> {
    let next = Rc::new(RefCell::new(0usize));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(HEADING_SELECTOR, {
                    let next = Rc::clone(&next);
                    move |el| {
                        let level = el
                            .tag_name()
                            .strip_prefix('h')
                            .and_then(|value| value.parse::<u8>().ok());
                        let mut idx = next.borrow_mut();
                        // Raw HTML headings have no Markdown counterpart; leave them alone.
                        if let Some(anchor) = anchors.get(*idx)
                            && level == Some(anchor.level)
                            && el.get_attribute("id").is_none()
                        {
                            el.set_attribute("id", &anchor.anchor)?;
                            *idx += 1;
                        }
                        Ok(())
                    }
                }),
                element!("a[href]", |el| {
                    let Some(href) = el.get_attribute("href") else {
                        return Ok(());
                    };
                    let Some(article_id) = internal_article_id(&href).map(str::to_string) else {
                        return Ok(());
                    };
                    let class = match el.get_attribute("class") {
                        Some(existing) if !existing.trim().is_empty() => {
                            format!("{} {INTERNAL_LINK_CLASS}", existing.trim())
                        }
                        _ => INTERNAL_LINK_CLASS.to_string(),
                    };
                    el.set_attribute("href", "#")?;
                    el.set_attribute("data-article-id", &article_id)?;
                    el.set_attribute("class", &class)?;
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document {
        message: err.to_string(),
    })
}

/// Headings carrying an `id`, in document order.
pub fn extract_headings(html: &str) -> Result<Vec<Heading>, RenderError> {
    let collected: Rc<RefCell<Vec<Option<Heading>>>> = Rc::new(RefCell::new(Vec::new()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(HEADING_SELECTOR, {
                    let collected = Rc::clone(&collected);
                    move |el| {
                        let level = el
                            .tag_name()
                            .strip_prefix('h')
                            .and_then(|value| value.parse::<u8>().ok());
                        let heading = match (level, el.get_attribute("id")) {
                            (Some(level), Some(anchor)) => Some(Heading {
                                level,
                                title: String::new(),
                                anchor,
                            }),
                            _ => None,
                        };
                        collected.borrow_mut().push(heading);
                        Ok(())
                    }
                }),
                text!(HEADING_SELECTOR, {
                    let collected = Rc::clone(&collected);
                    move |chunk| {
                        if let Some(Some(heading)) = collected.borrow_mut().last_mut() {
                            heading.title.push_str(chunk.as_str());
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::Document {
        message: err.to_string(),
    })?;

    let headings = collected
        .take()
        .into_iter()
        .flatten()
        .map(|mut heading| {
            heading.title = decode_entities(&heading.title)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            heading
        })
        .collect();
    Ok(headings)
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
