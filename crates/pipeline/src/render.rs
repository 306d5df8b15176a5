//! HTML renderer backed by askama templates.
//!
//! Regular pages render to `<path>.html` (`/` becomes `index.html`). Every
//! blog post renders through the `blog-post` page's chrome to
//! `<slug(title)>.html` at the archive root.

use askama::Template;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use sitepress_core::project::{BlogPost, Component, Page, Project};

use crate::error::PipelineError;
use crate::{PageProgress, ProgressSink, RenderedSite, Renderer};

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Page,
    BlogIndex,
    Post,
}

impl Layout {
    fn parse(name: &str) -> Result<Self, PipelineError> {
        match name {
            "" | "default" | "page" => Ok(Layout::Page),
            "blog" | "blog-index" => Ok(Layout::BlogIndex),
            "post" | "blog-post" | "blog_post" => Ok(Layout::Post),
            other => Err(PipelineError::Render(format!("unknown layout \"{other}\""))),
        }
    }
}

// ---------------------------------------------------------------------------
// View models
// ---------------------------------------------------------------------------

struct NavLink {
    href: String,
    label: String,
}

/// Shared header/footer data for every layout.
struct Chrome<'a> {
    site_name: &'a str,
    title: &'a str,
    description: &'a str,
    /// Relative prefix back to the archive root (`""`, `"../"`, ...).
    root: String,
    nav: &'a [NavLink],
    header_class: &'a str,
    main_class: &'a str,
    footer_class: &'a str,
    year: i32,
}

struct PostSummary {
    href: String,
    title: String,
    date: String,
    read_time: String,
    preview: String,
}

#[derive(Template)]
#[template(path = "page.html")]
struct PageTemplate<'a> {
    chrome: Chrome<'a>,
    body: Vec<String>,
}

#[derive(Template)]
#[template(path = "blog_index.html")]
struct BlogIndexTemplate<'a> {
    chrome: Chrome<'a>,
    body: Vec<String>,
    posts: &'a [PostSummary],
}

#[derive(Template)]
#[template(path = "post.html")]
struct PostTemplate<'a> {
    chrome: Chrome<'a>,
    title: &'a str,
    author: &'a str,
    date: String,
    read_time: &'a str,
    body: Vec<String>,
}

// ---------------------------------------------------------------------------
// Component views
// ---------------------------------------------------------------------------

#[derive(Template)]
#[template(source = "<h{{ level }}>{{ text }}</h{{ level }}>", ext = "html")]
struct HeadingView<'a> {
    level: u8,
    text: &'a str,
}

#[derive(Template)]
#[template(source = "<p>{{ text }}</p>", ext = "html")]
struct ParagraphView<'a> {
    text: &'a str,
}

#[derive(Template)]
#[template(source = "<a href=\"{{ url }}\">{{ label }}</a>", ext = "html")]
struct LinkView<'a> {
    url: &'a str,
    label: &'a str,
}

#[derive(Template)]
#[template(
    source = "<a role=\"button\" class=\"bg-primary text-background\" href=\"{{ url }}\">{{ label }}</a>",
    ext = "html"
)]
struct ButtonView<'a> {
    url: &'a str,
    label: &'a str,
}

#[derive(Template)]
#[template(source = "<img src=\"{{ url }}\" alt=\"{{ alt }}\">", ext = "html")]
struct ImageView<'a> {
    url: &'a str,
    alt: &'a str,
}

#[derive(Template)]
#[template(
    source = "<ul>{% for item in items %}<li>{{ item }}</li>{% endfor %}</ul>",
    ext = "html"
)]
struct ListView<'a> {
    items: &'a [String],
}

#[derive(Template)]
#[template(
    source = "<blockquote><p>{{ text }}</p>{% if !cite.is_empty() %}<cite>{{ cite }}</cite>{% endif %}</blockquote>",
    ext = "html"
)]
struct QuoteView<'a> {
    text: &'a str,
    cite: &'a str,
}

fn render_component(component: &Component) -> Result<String, askama::Error> {
    match component {
        Component::Heading { level, text } => HeadingView {
            level: *level,
            text,
        }
        .render(),
        Component::Paragraph { text } => ParagraphView { text }.render(),
        Component::Link { url, label } => LinkView { url, label }.render(),
        Component::Button { url, label } => ButtonView { url, label }.render(),
        Component::Image { url, alt } => ImageView { url, alt }.render(),
        Component::List { items } => ListView { items }.render(),
        Component::Quote { text, cite } => QuoteView {
            text,
            cite: cite.as_deref().unwrap_or_default(),
        }
        .render(),
    }
}

fn render_components(components: &[Component]) -> Result<Vec<String>, askama::Error> {
    components.iter().map(render_component).collect()
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Map a page path to its file name inside the archive.
fn output_name(path: &str) -> Result<String, PipelineError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok("index.html".to_string());
    }
    let trimmed = trimmed.strip_suffix(".html").unwrap_or(trimmed);
    let valid = trimmed
        .split('/')
        .all(|seg| !seg.is_empty() && seg != "." && seg != ".." && !seg.contains('\\'));
    if !valid {
        return Err(PipelineError::Render(format!("invalid page path \"{path}\"")));
    }
    Ok(format!("{trimmed}.html"))
}

fn root_prefix(file_name: &str) -> String {
    "../".repeat(file_name.matches('/').count())
}

fn rebase(nav: &[NavLink], root: &str) -> Vec<NavLink> {
    nav.iter()
        .map(|link| NavLink {
            href: format!("{root}{}", link.href),
            label: link.label.clone(),
        })
        .collect()
}

fn post_file_name(post: &BlogPost) -> Result<String, PipelineError> {
    let mut stem = slug::slugify(&post.title);
    if stem.is_empty() {
        stem = slug::slugify(&post.id);
    }
    if stem.is_empty() {
        return Err(PipelineError::Render(
            "blog post needs a title or id to name its page".to_string(),
        ));
    }
    Ok(format!("{stem}.html"))
}

/// `2024-03-05` → `March 5, 2024`; anything unparseable is shown as given.
fn format_date(date: &str) -> String {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|_| date.to_string())
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render every page and blog post of `project`, reporting each file on
    /// `progress` as it is finished.
    pub fn render_site(
        &self,
        project: &Project,
        progress: &ProgressSink,
    ) -> Result<RenderedSite, PipelineError> {
        let year = Utc::now().year();
        let mut site = RenderedSite::default();

        let pages: Vec<(&Page, String)> = project
            .site_pages()
            .map(|page| output_name(&page.path).map(|name| (page, name)))
            .collect::<Result<_, _>>()?;

        let posts: Vec<(&BlogPost, String)> = project
            .blog_posts
            .iter()
            .map(|post| post_file_name(post).map(|name| (post, name)))
            .collect::<Result<_, _>>()?;

        let total = pages.len() + posts.len();
        let mut done = 0;
        let mut report = |file_name: &str| {
            done += 1;
            let _ = progress.send(PageProgress {
                done,
                total,
                file_name: file_name.to_string(),
            });
        };

        let nav: Vec<NavLink> = pages
            .iter()
            .map(|(page, name)| NavLink {
                href: name.clone(),
                label: if page.name.is_empty() {
                    page.path.clone()
                } else {
                    page.name.clone()
                },
            })
            .collect();

        for (page, file_name) in &pages {
            let layout = Layout::parse(&page.layout)?;
            let title = if page.name.is_empty() {
                project.name.as_str()
            } else {
                page.name.as_str()
            };
            let root = root_prefix(file_name);
            let page_nav = rebase(&nav, &root);
            let chrome = Chrome {
                site_name: &project.name,
                title,
                description: &project.description,
                root: root.clone(),
                nav: &page_nav,
                header_class: &page.config.header.class_names,
                main_class: &page.config.main.class_names,
                footer_class: &page.config.footer.class_names,
                year,
            };
            let body = render_components(&page.components)?;

            let html = match layout {
                Layout::Page => PageTemplate { chrome, body }.render()?,
                Layout::BlogIndex => {
                    let summaries: Vec<PostSummary> = posts
                        .iter()
                        .map(|(post, post_file)| PostSummary {
                            href: format!("{root}{post_file}"),
                            title: post.title.clone(),
                            date: format_date(&post.created_date),
                            read_time: post.read_time.clone(),
                            preview: post.preview.clone(),
                        })
                        .collect();
                    BlogIndexTemplate {
                        chrome,
                        body,
                        posts: &summaries,
                    }
                    .render()?
                }
                Layout::Post => {
                    return Err(PipelineError::Render(format!(
                        "page \"{}\" uses the post layout, which is reserved for blog posts",
                        page.id
                    )))
                }
            };
            tracing::debug!(page = %page.id, file = %file_name, "Rendered page");
            insert_page(&mut site, file_name, html)?;
            report(file_name);
        }

        if !posts.is_empty() {
            let layout_page = project.blog_post_layout().ok_or_else(|| {
                PipelineError::Render("blog post layout page not found".to_string())
            })?;
            for (post, file_name) in &posts {
                let chrome = Chrome {
                    site_name: &project.name,
                    title: &post.title,
                    description: &post.preview,
                    root: String::new(),
                    nav: &nav,
                    header_class: &layout_page.config.header.class_names,
                    main_class: &layout_page.config.main.class_names,
                    footer_class: &layout_page.config.footer.class_names,
                    year,
                };
                let html = PostTemplate {
                    chrome,
                    title: &post.title,
                    author: &post.author,
                    date: format_date(&post.created_date),
                    read_time: &post.read_time,
                    body: render_components(&post.content)?,
                }
                .render()?;
                tracing::debug!(post = %post.id, file = %file_name, "Rendered blog post");
                insert_page(&mut site, file_name, html)?;
                report(file_name);
            }
        }

        if site.pages.is_empty() {
            return Err(PipelineError::Render(
                "project has no pages to render".to_string(),
            ));
        }
        Ok(site)
    }
}

fn insert_page(site: &mut RenderedSite, file_name: &str, html: String) -> Result<(), PipelineError> {
    if site
        .pages
        .insert(file_name.to_string(), html.into_bytes())
        .is_some()
    {
        return Err(PipelineError::Render(format!(
            "two pages render to the same file \"{file_name}\""
        )));
    }
    Ok(())
}

#[async_trait]
impl Renderer for HtmlRenderer {
    async fn render(
        &self,
        project: &Project,
        progress: &ProgressSink,
    ) -> Result<RenderedSite, PipelineError> {
        self.render_site(project, progress)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    fn render(project: &Project) -> Result<RenderedSite, PipelineError> {
        let (tx, _rx) = mpsc::unbounded_channel();
        HtmlRenderer::new().render_site(project, &tx)
    }

    fn sample_project() -> Project {
        serde_json::from_value(json!({
            "id": "demo",
            "name": "Demo Site",
            "description": "A demo",
            "pages": [
                {"id": "home", "name": "Home", "path": "/", "layout": "default",
                 "config": {"header": {"classNames": "hdr"}},
                 "components": [
                     {"type": "heading", "text": "Welcome", "level": 1},
                     {"type": "paragraph", "text": "Fish & <chips>"}
                 ]},
                {"id": "blog", "name": "Blog", "path": "/blog", "layout": "blog"},
                {"id": "blog-post", "name": "Post", "path": "/post", "layout": "post",
                 "config": {"main": {"classNames": "post-main"}}}
            ],
            "blogPosts": [
                {"id": "b1", "title": "Hello World", "createdDate": "2024-03-05",
                 "author": "Ana", "preview": "First!",
                 "content": [{"type": "list", "items": ["a", "b"]}]}
            ]
        }))
        .unwrap()
    }

    fn page<'a>(site: &'a RenderedSite, name: &str) -> &'a str {
        std::str::from_utf8(&site.pages[name]).unwrap()
    }

    #[test]
    fn output_names() {
        assert_eq!(output_name("/").unwrap(), "index.html");
        assert_eq!(output_name("").unwrap(), "index.html");
        assert_eq!(output_name("/about").unwrap(), "about.html");
        assert_eq!(output_name("/docs/intro/").unwrap(), "docs/intro.html");
        assert_eq!(output_name("/contact.html").unwrap(), "contact.html");
        assert_matches!(output_name("/../etc"), Err(PipelineError::Render(_)));
        assert_matches!(output_name("/a//b"), Err(PipelineError::Render(_)));
    }

    #[test]
    fn renders_pages_and_posts_to_expected_files() {
        let site = render(&sample_project()).unwrap();
        let names: Vec<_> = site.pages.keys().cloned().collect();
        assert_eq!(names, ["blog.html", "hello-world.html", "index.html"]);
    }

    #[test]
    fn every_rendered_file_is_reported_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        HtmlRenderer::new()
            .render_site(&sample_project(), &tx)
            .unwrap();
        drop(tx);

        let mut reported = Vec::new();
        while let Ok(update) = rx.try_recv() {
            reported.push(update);
        }
        let files: Vec<_> = reported.iter().map(|p| p.file_name.as_str()).collect();
        assert_eq!(files, ["index.html", "blog.html", "hello-world.html"]);
        assert!(reported.iter().all(|p| p.total == 3));
        assert_eq!(
            reported.iter().map(|p| p.done).collect::<Vec<_>>(),
            [1, 2, 3]
        );
    }

    #[test]
    fn closed_progress_receiver_does_not_fail_render() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert!(HtmlRenderer::new().render_site(&sample_project(), &tx).is_ok());
    }

    #[test]
    fn page_content_is_escaped_and_styled() {
        let site = render(&sample_project()).unwrap();
        let index = page(&site, "index.html");
        assert!(index.contains("<h1>Welcome</h1>"));
        assert!(index.contains("Fish &amp; &lt;chips&gt;"));
        assert!(index.contains("class=\"hdr\""));
        assert!(index.contains("css/tailwind.css"));
    }

    #[test]
    fn blog_index_lists_posts_and_post_uses_layout_page_config() {
        let site = render(&sample_project()).unwrap();
        let blog = page(&site, "blog.html");
        assert!(blog.contains("hello-world.html"));
        assert!(blog.contains("March 5, 2024"));

        let post = page(&site, "hello-world.html");
        assert!(post.contains("<h1>Hello World</h1>"));
        assert!(post.contains("By Ana"));
        assert!(post.contains("<li>a</li><li>b</li>"));
        assert!(post.contains("class=\"post-main\""));
    }

    #[test]
    fn nested_pages_link_back_to_root() {
        let mut project = sample_project();
        project.pages[0].path = "/docs/start".into();
        let site = render(&project).unwrap();
        assert!(site.pages.contains_key("docs/start.html"));
        assert_eq!(root_prefix("docs/start.html"), "../");
        assert_eq!(root_prefix("index.html"), "");
    }

    #[test]
    fn posts_without_layout_page_fail() {
        let mut project = sample_project();
        project.pages.retain(|p| p.id != "blog-post");
        assert_matches!(
            render(&project),
            Err(PipelineError::Render(msg)) if msg.contains("layout page not found")
        );
    }

    #[test]
    fn unknown_layout_fails() {
        let mut project = sample_project();
        project.pages[0].layout = "magazine".into();
        assert_matches!(
            render(&project),
            Err(PipelineError::Render(msg)) if msg.contains("magazine")
        );
    }

    #[test]
    fn duplicate_output_file_fails() {
        let mut project = sample_project();
        project.pages[1].path = "/".into();
        project.pages[1].layout = "default".into();
        assert_matches!(
            render(&project),
            Err(PipelineError::Render(msg)) if msg.contains("index.html")
        );
    }

    #[test]
    fn empty_project_fails() {
        assert_matches!(
            render(&Project::default()),
            Err(PipelineError::Render(_))
        );
    }

    #[test]
    fn date_formatting_falls_back_to_raw_value() {
        assert_eq!(format_date("2024-12-25"), "December 25, 2024");
        assert_eq!(format_date("someday"), "someday");
    }
}
