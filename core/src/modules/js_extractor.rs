//! JavaScript resource discovery over a page's HTML.
//!
//! Three independent sources are unioned, in order:
//! 1. `<script src>` tags,
//! 2. framework loader hints (`import()`, `require()`, route/component
//!    manifests, module preloads),
//! 3. bundler chunk manifests and hashed bundle names, turned into guessed
//!    asset paths.
//!
//! Nothing here touches the network.

use log::debug;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::core::target_manager::{ScriptTarget, TargetManager};
use crate::models::ExtractionMethod;
use crate::modules::matchers::{self, Matcher};

const EXCLUDED_EXTENSIONS: &[&str] = &[
    ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf", ".eot",
    ".mp4", ".mp3", ".pdf",
];

/// Where guessed chunk files usually live, most likely first.
const CHUNK_PREFIXES: &[&str] = &["/static/js/", "/js/", "/assets/", "/"];

const HINT_RULES: &[(&str, &str, usize)] = &[
    ("dynamic_import", r#"import\(\s*["'`]([^"'`\s]+?\.js)(?:\?[^"'`\s]*)?["'`]\s*\)"#, 1),
    ("require", r#"require\(\s*["']([^"'\s]+?\.js)["']\s*\)"#, 1),
    (
        "loader_field",
        r#"\b(?:component|loader|chunk|path|src|file|script)\s*:\s*["']([^"'\s]+?\.js)["']"#,
        1,
    ),
    (
        "module_preload",
        r#"<link[^>]+rel=["']?(?:modulepreload|preload)["']?[^>]*href=["']([^"']+?\.js)(?:\?[^"']*)?["']"#,
        1,
    ),
];

/// Whether a URL plausibly points at a JavaScript file.
///
/// Excluded static extensions always lose, even when the URL mentions
/// `javascript` somewhere.
pub fn is_valid_js_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or("");
    if EXCLUDED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    path.ends_with(".js") || lower.contains("javascript") || lower.contains("js")
}

pub struct JsExtractor {
    hint_matchers: Vec<Box<dyn Matcher>>,
    manifest_entry: Regex,
    bundle_name: Regex,
}

impl JsExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            hint_matchers: matchers::compile(HINT_RULES)?,
            // "chunk-id":"contenthash" as emitted by webpack-style runtimes
            manifest_entry: Regex::new(r#""([\w-]{1,64})"\s*:\s*"([0-9a-f]{8,32})""#)?,
            bundle_name: Regex::new(
                r#"["'`]([\w.-]*?(?:app|vendor|main|bundle)[\w-]*?\.[0-9a-f]{8,}(?:\.[\w-]+)*?)["'`]"#,
            )?,
        })
    }

    /// Returns up to `max_files` distinct script URLs found in `html`.
    pub fn extract(&self, html: &str, base_url: &Url, max_files: usize) -> Vec<ScriptTarget> {
        let mut targets = TargetManager::with_limit(max_files);

        self.collect_script_tags(html, base_url, &mut targets);
        self.collect_framework_hints(html, base_url, &mut targets);
        self.collect_chunk_manifest(html, base_url, &mut targets);
        self.collect_bundle_names(html, base_url, &mut targets);

        debug!("found {} script URL(s) in {}", targets.len(), base_url);
        targets.into_targets()
    }

    fn collect_script_tags(&self, html: &str, base_url: &Url, targets: &mut TargetManager) {
        let selector = match Selector::parse("script[src]") {
            Ok(s) => s,
            Err(_) => return,
        };
        let document = Html::parse_document(html);
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                accept(targets, base_url, src, ExtractionMethod::StaticTag);
            }
        }
    }

    fn collect_framework_hints(&self, html: &str, base_url: &Url, targets: &mut TargetManager) {
        for hint in matchers::find_all(&self.hint_matchers, html) {
            accept(targets, base_url, &hint, ExtractionMethod::FrameworkHint);
        }
    }

    fn collect_chunk_manifest(&self, html: &str, base_url: &Url, targets: &mut TargetManager) {
        for cap in self.manifest_entry.captures_iter(html) {
            let file = format!("{}.{}.js", &cap[1], &cap[2]);
            accept_first_guess(targets, base_url, &file, ExtractionMethod::ChunkManifest);
        }
    }

    fn collect_bundle_names(&self, html: &str, base_url: &Url, targets: &mut TargetManager) {
        for cap in self.bundle_name.captures_iter(html) {
            let name = &cap[1];
            let file = if name.to_lowercase().ends_with(".js") {
                name.to_string()
            } else {
                format!("{}.js", name)
            };
            // already referenced by a tag or hint under some directory
            if targets.any_ends_with(&format!("/{}", file)) {
                continue;
            }
            accept_first_guess(targets, base_url, &file, ExtractionMethod::BundleName);
        }
    }
}

/// Resolves `raw` against `base_url` and queues it if it looks like a script.
fn accept(targets: &mut TargetManager, base_url: &Url, raw: &str, method: ExtractionMethod) -> bool {
    if targets.is_full() {
        return false;
    }
    let resolved = match base_url.join(raw.trim()) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        _ => return false,
    };
    let url = resolved.to_string();
    if !is_valid_js_url(&url) {
        return false;
    }
    targets.add_target(url, method)
}

/// The four prefixes are guesses about one file, so only the first one that
/// passes the filter is kept.
fn accept_first_guess(targets: &mut TargetManager, base_url: &Url, file: &str, method: ExtractionMethod) {
    for prefix in CHUNK_PREFIXES {
        let candidate = format!("{}{}", prefix, file);
        let resolved = match base_url.join(&candidate) {
            Ok(u) => u.to_string(),
            Err(_) => continue,
        };
        if is_valid_js_url(&resolved) {
            targets.add_target(resolved, method);
            return;
        }
    }
}
