use crate::feeds::FeedKind;
use crate::normalize::StaticPoint;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    pub thread_count: Option<usize>,
    pub content_api: ContentApiConfig,
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub revalidate: RevalidateConfig,
    pub map: MapConfig,
    pub template_dir: Option<PathBuf>,
    #[serde(default)]
    pub static_points: Vec<StaticPoint>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ContentApiConfig {
    /// Headless CMS serving `{ data: [...] }` collections.
    pub cms_url: String,
    /// Bank Data service serving GeoJSON.
    pub bankdata_url: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct FeedConfig {
    pub kind: FeedKind,
    /// Full URL; when absent the kind's default path on its base URL is used.
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct FetchConfig {
    pub attempts: u32,
    pub timeout_secs: u64,
    pub backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout_secs: 45,
            backoff_ms: 1000,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct RevalidateConfig {
    pub interval_secs: u64,
    pub retry_secs: u64,
}

impl Default for RevalidateConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            retry_secs: 60,
        }
    }
}

impl RevalidateConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct MapConfig {
    #[serde(default = "default_style_url")]
    pub style_url: String,
    #[serde(default = "default_terrain_url")]
    pub terrain_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_styles")]
    pub styles: Vec<String>,
    #[serde(default = "default_style")]
    pub default_style: String,
    #[serde(default = "default_center")]
    pub center: [f64; 2],
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default = "default_circle_radius")]
    pub circle_radius: f64,
    #[serde(default = "default_exaggeration")]
    pub terrain_exaggeration: f64,
}

fn default_listen() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_true() -> bool {
    true
}

fn default_feeds() -> Vec<FeedConfig> {
    FeedKind::ALL
        .iter()
        .map(|kind| FeedConfig {
            kind: *kind,
            url: None,
            enabled: true,
        })
        .collect()
}

fn default_style_url() -> String {
    "https://api.maptiler.com/maps/{style}/style.json?key={key}".to_string()
}

fn default_terrain_url() -> String {
    "https://api.maptiler.com/tiles/terrain-rgb-v2/tiles.json?key={key}".to_string()
}

fn default_styles() -> Vec<String> {
    vec!["outdoor".to_string(), "satellite".to_string()]
}

fn default_style() -> String {
    "outdoor".to_string()
}

fn default_center() -> [f64; 2] {
    [110.0, -7.0]
}

fn default_zoom() -> f64 {
    6.0
}

fn default_circle_radius() -> f64 {
    7.0
}

fn default_exaggeration() -> f64 {
    1.5
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = if let Ok(path) = std::env::var("ASTACALA_CONFIG") {
            PathBuf::from(path)
        } else if Path::new("astacala.toml").exists() {
            PathBuf::from("astacala.toml")
        } else if Path::new("astacala.example.toml").exists() {
            PathBuf::from("astacala.example.toml")
        } else {
            return Err(anyhow::anyhow!(
                "Configuration file not found. Please create astacala.toml or provide astacala.example.toml."
            ));
        };

        let mut config = Self::from_file(&path)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("ASTACALA_CONTENT_API_URL") {
            self.content_api.cms_url = url;
        }
        if let Ok(url) = std::env::var("ASTACALA_BANKDATA_URL") {
            self.content_api.bankdata_url = url;
        }
        if let Ok(key) = std::env::var("ASTACALA_MAPTILER_KEY") {
            self.map.api_key = key;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !self.map.styles.contains(&self.map.default_style) {
            anyhow::bail!(
                "default_style `{}` is not one of the configured styles {:?}",
                self.map.default_style,
                self.map.styles
            );
        }
        if self.fetch.attempts == 0 {
            anyhow::bail!("fetch.attempts must be at least 1");
        }
        Ok(())
    }

    pub fn feed_url(&self, feed: &FeedConfig) -> String {
        feed.url.clone().unwrap_or_else(|| feed.kind.default_url(&self.content_api))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [content_api]
        cms_url = "http://cms.local"
        bankdata_url = "http://bankdata.local/api/v1"

        [map]
        api_key = "k"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.listen, "0.0.0.0:3001");
        assert_eq!(config.feeds.len(), FeedKind::ALL.len());
        assert_eq!(config.fetch.attempts, 3);
        assert_eq!(config.revalidate.interval_secs, 3600);
        assert_eq!(config.map.default_style, "outdoor");
        assert_eq!(config.map.center, [110.0, -7.0]);
        assert_eq!(
            config.feed_url(&config.feeds[0]),
            config.feeds[0].kind.default_url(&config.content_api)
        );
    }

    #[test]
    fn rejects_unknown_default_style() {
        let content = format!("{MINIMAL}\ndefault_style = \"night\"\n");
        assert!(Config::parse(&content).is_err());
    }

    #[test]
    fn reads_feeds_and_static_points_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
            listen = "127.0.0.1:8080"

            [content_api]
            cms_url = "http://cms.local"
            bankdata_url = "http://bankdata.local/api/v1"

            [[feeds]]
            kind = "iss_caves"
            url = "http://mirror.local/iss.json"

            [[feeds]]
            kind = "astacala_climbing"
            enabled = false

            [map]
            styles = ["outdoor", "satellite", "topo"]

            [[static_points]]
            name = "Gunung Parang"
            coordinates = "-6.7462, 107.3456"
            division = "panjatTebing"
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feed_url(&config.feeds[0]), "http://mirror.local/iss.json");
        assert!(!config.feeds[1].enabled);
        assert_eq!(config.map.styles.len(), 3);
        assert_eq!(config.static_points[0].division, "panjatTebing");
    }

    #[test]
    fn example_config_parses_with_static_point_divisions() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("astacala.example.toml");
        let config = Config::from_file(&path).unwrap();
        let divisions: Vec<_> = config
            .static_points
            .iter()
            .map(|p| (p.name.as_str(), p.division.as_str()))
            .collect();
        assert_eq!(
            divisions,
            [
                ("Gunung Parang", "panjatTebing"),
                ("Goa Jatijajar", "caving"),
                ("Gunung Banyak", "paralayang"),
            ]
        );
    }
}
