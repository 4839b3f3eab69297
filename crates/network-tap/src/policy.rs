//! Ignore policy for static assets.

use url::Url;

const IGNORED_KINDS: &[&str] = &["Script", "Stylesheet", "Image", "Font", "Media"];

const IGNORED_EXTENSIONS: &[&str] = &[
    "js", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "map", "woff", "woff2", "ttf",
    "eot",
];

/// Decides which requests never enter the pending table.
#[derive(Clone, Debug)]
pub struct IgnorePolicy {
    kinds: Vec<String>,
    extensions: Vec<String>,
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        Self {
            kinds: IGNORED_KINDS.iter().map(|kind| kind.to_string()).collect(),
            extensions: IGNORED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

impl IgnorePolicy {
    pub fn should_ignore(&self, resource_kind: Option<&str>, url: &str) -> bool {
        if let Some(kind) = resource_kind {
            if self.kinds.iter().any(|ignored| ignored.eq_ignore_ascii_case(kind)) {
                return true;
            }
        }
        self.has_static_extension(url)
    }

    fn has_static_extension(&self, url: &str) -> bool {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url
                .split(|c| c == '?' || c == '#')
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        let file = path.rsplit('/').next().unwrap_or_default();
        let Some((_, ext)) = file.rsplit_once('.') else {
            return false;
        };
        self.extensions
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(ext))
    }
}
