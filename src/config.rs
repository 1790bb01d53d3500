mod types;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use take_mut::take;
use tracing::{debug, info};
use url::Url;

pub use self::types::Duration;

fn default_sync_interval() -> Duration {
    Config::default().sync_interval
}

fn default_fail_fast() -> bool {
    Config::default().fail_fast
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: PathBuf,

    /// The feed list file, re-read at the start of every sync run.
    pub feeds_path: PathBuf,

    #[serde(default = "default_sync_interval")]
    pub sync_interval: Duration,

    /// When set, the first failed feed download aborts the whole sync run.
    /// When unset, failed feeds are logged and the healthy ones still sync.
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

impl Config {
    pub fn update(&mut self, args: crate::cli::Args) {
        fn set_if_some<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }

        set_if_some(&mut self.bind_addr, args.bind_addr);
        set_if_some(&mut self.db_path, args.db_path);
        set_if_some(&mut self.feeds_path, args.feeds_path);
    }

    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // do the dance for safety (so that I don't forget to update this after adding new fields).
        take(self, |this| Self {
            bind_addr: this.bind_addr,
            db_path: config_dir.join(&this.db_path),
            feeds_path: config_dir.join(&this.feeds_path),
            sync_interval: this.sync_interval,
            fail_fast: this.fail_fast,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1:20653".into(),
            db_path: "./calsplit.sqlite3".into(),
            feeds_path: "./feeds.toml".into(),
            sync_interval: Duration::from_secs(3600),
            fail_fast: true,
        }
    }
}

/// One source calendar, identified by its name in the store.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Feed {
    pub name: String,
    pub url: Url,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FeedsFile {
    feeds: Vec<Feed>,
}

/// Reads the feed list file. Called once per sync run, before any network
/// activity, so feeds can be added without restarting the process.
pub fn load_feeds(path: impl AsRef<Path>) -> Result<Vec<Feed>> {
    let path = path.as_ref();

    let contents = std::fs::read_to_string(path)
        .with_context(|| anyhow!("could not read the feed list file `{}`", path.display()))?;
    let feeds_file: FeedsFile = toml::from_str(&contents)
        .with_context(|| anyhow!("could not parse the feed list file `{}`", path.display()))?;

    Ok(feeds_file.feeds)
}

pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        debug!("Trying to load {}", path.display());
        let mut contents = String::new();

        {
            let mut f = match File::open(path) {
                Ok(f) => f,

                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %path.display(), "File not found, skipping");
                    continue;
                }

                Err(e) => {
                    return Err(e)
                        .context(anyhow!("could not load a config file `{}`", path.display()));
                }
            };

            f.read_to_string(&mut contents).with_context(|| {
                anyhow!(
                    "could not read the contents of a config file `{}`",
                    path.display()
                )
            })?;
        }

        let mut cfg: Config = toml::from_str(&contents)
            .with_context(|| anyhow!("could not load the config file `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!("Loaded a config file `{}`", path.display());

        return Ok(cfg);
    }

    info!("Using the default config");

    Ok(Default::default())
}
