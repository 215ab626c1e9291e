use std::cmp::Reverse;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{ArticleFilter, ContentError, ContentSource};
use crate::domain::articles::{Article, CategoryMap};

const MARKDOWN_EXTENSION: &str = "md";
const DESCRIPTION_MAX_CHARS: usize = 160;
const TAGS_MARKER: &str = "<!-- tags:";

/// Articles stored as Markdown files under a root directory.
///
/// Each subdirectory is a category and each `*.md` file inside it an article
/// with id `"{category}/{stem}"`. Files directly under the root have no
/// category and id `"{stem}"`. Hidden entries are skipped.
#[derive(Debug, Clone)]
pub struct MarkdownDirectorySource {
    root: PathBuf,
}

impl MarkdownDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an article id to its file, rejecting anything that could
    /// escape the root.
    fn path_for(&self, id: &str) -> Result<PathBuf, ContentError> {
        let relative = Path::new(id);
        let depth = relative.components().count();
        let well_formed = !id.is_empty()
            && !id.contains('\\')
            && (1..=2).contains(&depth)
            && relative
                .components()
                .all(|part| matches!(part, Component::Normal(name) if !is_hidden(name)));
        if !well_formed {
            return Err(ContentError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(format!("{id}.{MARKDOWN_EXTENSION}")))
    }

    async fn category_dirs(&self) -> Result<Vec<String>, ContentError> {
        let mut dirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|err| ContentError::io(&self.root, err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ContentError::io(&self.root, err))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map_err(|err| ContentError::io(entry.path(), err))?
                .is_dir();
            if is_dir {
                dirs.push(name);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Summaries of the articles directly inside `dir`.
    async fn articles_in(
        &self,
        dir: &Path,
        category: Option<&str>,
    ) -> Result<Vec<Article>, ContentError> {
        let mut articles = Vec::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|err| ContentError::io(dir, err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ContentError::io(dir, err))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(MARKDOWN_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            let id = match category {
                Some(category) => format!("{category}/{stem}"),
                None => stem.to_string(),
            };
            match load_article(&path, id, category).await {
                Ok(article) => articles.push(article.summary()),
                Err(err) => warn!(
                    target = "blog_cache::content::directory",
                    path = %path.display(),
                    error = %err,
                    "Skipping unreadable article"
                ),
            }
        }
        Ok(articles)
    }

    async fn all_articles(&self) -> Result<Vec<Article>, ContentError> {
        let mut articles = self.articles_in(&self.root, None).await?;
        for category in self.category_dirs().await? {
            let dir = self.root.join(&category);
            articles.extend(self.articles_in(&dir, Some(&category)).await?);
        }
        sort_newest_first(&mut articles);
        Ok(articles)
    }
}

#[async_trait]
impl ContentSource for MarkdownDirectorySource {
    async fn list_categories(&self) -> Result<CategoryMap, ContentError> {
        let mut categories = CategoryMap::new();
        for category in self.category_dirs().await? {
            let dir = self.root.join(&category);
            let mut articles = self.articles_in(&dir, Some(&category)).await?;
            sort_newest_first(&mut articles);
            categories.insert(category, articles);
        }
        debug!(
            target = "blog_cache::content::directory",
            root = %self.root.display(),
            categories = categories.len(),
            "Scanned content directory"
        );
        Ok(categories)
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, ContentError> {
        let mut articles = self.all_articles().await?;
        articles.retain(|article| filter.matches(article));
        Ok(articles)
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>, ContentError> {
        let path = self.path_for(id)?;
        let category = id.split_once('/').map(|(category, _)| category);
        match load_article(&path, id.to_string(), category).await {
            Ok(article) => Ok(Some(article)),
            Err(ContentError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

async fn load_article(
    path: &Path,
    id: String,
    category: Option<&str>,
) -> Result<Article, ContentError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| ContentError::io(path, err))?;
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|err| ContentError::io(path, err))?;

    let updated_at = metadata.modified().ok().map(timestamp);
    let created_at = metadata.created().ok().map(timestamp).or(updated_at);
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();

    let article = Article {
        title: parse_title(&content).unwrap_or_else(|| stem.to_string()),
        description: parse_description(&content),
        tags: parse_tags(&content),
        id,
        category: category.map(str::to_string),
        content: Some(content),
        created_at,
        updated_at,
        reading_time: 0,
        word_count: 0,
    };
    Ok(article.with_metrics())
}

fn timestamp(time: SystemTime) -> OffsetDateTime {
    OffsetDateTime::from(time)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_none_or(|name| name.starts_with('.'))
}

fn sort_newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| {
        Reverse(a.created_at)
            .cmp(&Reverse(b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Lines of the body outside front matter and fenced code.
fn body_lines(content: &str) -> impl Iterator<Item = &str> {
    let mut lines = content.lines().peekable();
    let mut in_front_matter = lines.peek().is_some_and(|line| line.trim() == "---");
    if in_front_matter {
        lines.next();
    }
    let mut in_fence = false;
    lines.filter(move |line| {
        let trimmed = line.trim();
        if in_front_matter {
            if trimmed == "---" {
                in_front_matter = false;
            }
            return false;
        }
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            return false;
        }
        !in_fence
    })
}

fn parse_title(content: &str) -> Option<String> {
    body_lines(content)
        .find_map(|line| line.trim().strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

fn parse_description(content: &str) -> String {
    let Some(line) = body_lines(content).map(str::trim).find(|line| {
        !line.is_empty()
            && !line.starts_with('#')
            && !line.starts_with("<!--")
            && !line.starts_with('|')
            && !line.starts_with("![")
    }) else {
        return String::new();
    };
    line.chars().take(DESCRIPTION_MAX_CHARS).collect()
}

fn parse_tags(content: &str) -> Vec<String> {
    content
        .lines()
        .find_map(|line| {
            line.trim()
                .strip_prefix(TAGS_MARKER)
                .and_then(|rest| rest.strip_suffix("-->"))
        })
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
