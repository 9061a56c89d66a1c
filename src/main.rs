use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use feedpull::config::Config;
use feedpull::feed::{self, Article};
use feedpull::storage::{Database, DatabaseError, LAST_FEED_URL};
use feedpull::util::{single_line, truncate_to_width, validate_feed_url};

/// Get the config directory path (~/.config/feedpull/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedpull"))
}

#[derive(Parser, Debug)]
#[command(name = "feedpull", about = "Fetch, parse and store RSS feed items")]
struct Args {
    /// Config file (default: ~/.config/feedpull/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the config file)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a feed and store its items
    Fetch {
        /// Feed URL (default: last fetched URL, then `default_feed_url`)
        url: Option<String>,
    },
    /// Parse a feed file (or stdin) and print its items without storing them
    Parse {
        /// RSS file; `-` or absent reads stdin
        file: Option<PathBuf>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List stored articles
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Delete a stored article by id
    Delete { id: i64 },
    /// Read or write a preference
    Pref {
        #[command(subcommand)]
        action: PrefAction,
    },
}

#[derive(Subcommand, Debug)]
enum PrefAction {
    /// Print a preference value
    Get { key: String },
    /// Store a preference value
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match args.command {
        // Parsing a file never touches the database
        Command::Parse { file, json } => {
            let articles = parse_input(file.as_ref())?;
            print_articles(&articles, json, config.list_title_width)
        }
        Command::Fetch { url } => {
            let db = database(args.db, &config, &config_dir).await?;
            fetch(&db, &config, url).await
        }
        Command::List { json } => {
            let db = database(args.db, &config, &config_dir).await?;
            list(&db, json, config.list_title_width).await
        }
        Command::Delete { id } => {
            let db = database(args.db, &config, &config_dir).await?;
            if db.delete_article(id).await.context("Failed to delete article")? {
                println!("Deleted article {}", id);
                Ok(())
            } else {
                anyhow::bail!("No article with id {}", id)
            }
        }
        Command::Pref { action } => {
            let db = database(args.db, &config, &config_dir).await?;
            match action {
                PrefAction::Get { key } => {
                    match db.get_preference(&key).await.context("Failed to read preference")? {
                        Some(value) => println!("{}", value),
                        None => anyhow::bail!("Preference '{}' is not set", key),
                    }
                    Ok(())
                }
                PrefAction::Set { key, value } => {
                    db.set_preference(&key, &value)
                        .await
                        .context("Failed to save preference")?;
                    Ok(())
                }
            }
        }
    }
}

/// Open the database named by `--db`, or the config's path under the config
/// directory (created on demand).
async fn database(db: Option<PathBuf>, config: &Config, config_dir: &Path) -> Result<Database> {
    let db_path = match db {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(config_dir).with_context(|| {
                format!("Failed to create config directory {}", config_dir.display())
            })?;
            config.database_path(config_dir)
        }
    };
    open_database(&db_path).await
}

async fn open_database(path: &Path) -> Result<Database> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match Database::open(path_str).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => anyhow::bail!(
            "The database at {} is locked by another process. Please close it and try again.",
            path.display()
        ),
        Err(e) => Err(e).with_context(|| format!("Failed to open database {}", path.display())),
    }
}

async fn fetch(db: &Database, config: &Config, url: Option<String>) -> Result<()> {
    let url = match url {
        Some(url) => url,
        None => match db.get_preference(LAST_FEED_URL).await? {
            Some(url) => url,
            None => config.default_feed_url.clone().ok_or_else(|| {
                anyhow::anyhow!("No feed URL given and no default_feed_url configured")
            })?,
        },
    };

    let validated = validate_feed_url(&url, config.allow_private_hosts)
        .with_context(|| format!("Refusing to fetch '{}'", url))?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("feedpull/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let articles = feed::fetch_articles(&client, validated.as_str(), &config.fetch_options())
        .await
        .with_context(|| format!("Failed to fetch {}", validated))?;

    let inserted = db
        .upsert_articles(Some(validated.as_str()), &articles)
        .await
        .context("Failed to store articles")?;
    db.set_preference(LAST_FEED_URL, validated.as_str())
        .await
        .context("Failed to remember feed URL")?;

    tracing::info!(feed = %validated, items = articles.len(), new = inserted, "Feed refreshed");
    println!("{} articles parsed, {} new", articles.len(), inserted);
    Ok(())
}

fn parse_input(file: Option<&PathBuf>) -> Result<Vec<Article>> {
    match file {
        Some(path) if path.as_os_str() != "-" => {
            let handle = std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            feed::parse(BufReader::new(handle))
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
        _ => feed::parse(std::io::stdin().lock()).context("Failed to parse stdin"),
    }
}

async fn list(db: &Database, json: bool, width: usize) -> Result<()> {
    let stored = db.get_all_articles().await.context("Failed to load articles")?;
    if json {
        return write_json(&stored);
    }

    let mut out = std::io::stdout().lock();
    if stored.is_empty() {
        writeln!(out, "No articles stored. Run `feedpull fetch URL` first.")?;
        return Ok(());
    }
    for article in &stored {
        let row = Row {
            id: Some(article.id),
            title: article.title.as_deref(),
            pub_date: article.pub_date.as_deref(),
            link: article.link.as_deref(),
        };
        row.write(&mut out, width)?;
    }
    Ok(())
}

fn print_articles(articles: &[Article], json: bool, width: usize) -> Result<()> {
    if json {
        return write_json(&articles);
    }

    let mut out = std::io::stdout().lock();
    for article in articles {
        let row = Row {
            id: None,
            title: article.title.as_deref(),
            pub_date: article.pub_date.as_deref(),
            link: article.link.as_deref(),
        };
        row.write(&mut out, width)?;
    }
    writeln!(out, "{} items", articles.len())?;
    Ok(())
}

/// One line of `list`/`parse` output.
struct Row<'a> {
    id: Option<i64>,
    title: Option<&'a str>,
    pub_date: Option<&'a str>,
    link: Option<&'a str>,
}

impl Row<'_> {
    fn write(&self, out: &mut impl Write, width: usize) -> Result<()> {
        let title = single_line(self.title.unwrap_or("(untitled)"));
        let title = truncate_to_width(&title, width);
        let pub_date = single_line(self.pub_date.unwrap_or("-"));
        let link = single_line(self.link.unwrap_or("-"));

        match self.id {
            Some(id) => writeln!(out, "{:>5}  {}  {}  <{}>", id, pub_date, title, link)?,
            None => writeln!(out, "{}  {}  <{}>", pub_date, title, link)?,
        }
        Ok(())
    }
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).context("Failed to write JSON")?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_command_takes_file_and_json_flag() {
        let args = Args::try_parse_from(["feedpull", "parse", "feed.xml", "--json"]).unwrap();
        match args.command {
            Command::Parse { file, json } => {
                assert_eq!(file, Some(PathBuf::from("feed.xml")));
                assert!(json);
            }
            other => panic!("Expected Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_db_flag_is_global() {
        let args = Args::try_parse_from(["feedpull", "list", "--db", "/tmp/a.db"]).unwrap();
        assert_eq!(args.db, Some(PathBuf::from("/tmp/a.db")));
        assert!(matches!(args.command, Command::List { json: false }));
    }

    #[test]
    fn test_row_without_fields_uses_placeholders() {
        let row = Row {
            id: Some(7),
            title: None,
            pub_date: None,
            link: None,
        };
        let mut out = Vec::new();
        row.write(&mut out, 60).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "    7  -  (untitled)  <->\n");
    }
}
