//! CLI entry point for `boardnews`.

use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use boardnews::cache::ArticleCache;
use boardnews::config::{self, Config};
use boardnews::model::{CoreMsgId, FullMsgId};
use boardnews::nntp::{ArticleSink, CopyMode, LineResponder};
use boardnews::parser::ArticleProcessor;
use boardnews::store::{FileStore, JsonPostSource, NoThumbnailer};

#[derive(Parser)]
#[command(
    name = "boardnews",
    version,
    about = "Imageboard posts as NNTP articles: decode, generate and serve through the article cache"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (overrides the config file)
    #[arg(long, global = true, value_name = "DIR", env = "BOARDNEWS_DATA")]
    data_dir: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an article file and store it as a post
    Ingest {
        path: PathBuf,
        /// Newsgroup to record when the article names none
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Serve a full article (220) through the cache
    Article { msgid: String },
    /// Serve the article headers (221) through the cache
    Head { msgid: String },
    /// Serve the article body (222) through the cache
    Body { msgid: String },
    /// Check that an article exists (223)
    Stat { msgid: String },
    /// Write the raw article to stdout, bypassing the cache
    Generate { msgid: String },
    /// Show or write the configuration
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        write_default: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config();
    if let Some(dir) = cli.data_dir.clone() {
        config.general.data_dir = Some(dir);
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Ingest { path, group } => cmd_ingest(&config, &path, group.as_deref()),
        Commands::Article { msgid } => cmd_serve(&config, &msgid, CopyMode::Full),
        Commands::Head { msgid } => cmd_serve(&config, &msgid, CopyMode::Head),
        Commands::Body { msgid } => cmd_serve(&config, &msgid, CopyMode::Body),
        Commands::Stat { msgid } => cmd_serve(&config, &msgid, CopyMode::Stat),
        Commands::Generate { msgid } => cmd_generate(&config, &msgid),
        Commands::Config { write_default } => cmd_config(&config, write_default),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "boardnews.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Open the content store and the post database under the data directory.
fn open_stores(config: &Config) -> anyhow::Result<(FileStore, JsonPostSource)> {
    let root = config::data_dir(config);
    let store = FileStore::open(&root).with_context(|| format!("opening store at {}", root.display()))?;
    let posts = JsonPostSource::open(root.join("posts"))?;
    Ok((store, posts))
}

/// Accept `<id>` or a bare `id`.
fn parse_msgid(raw: &str) -> anyhow::Result<CoreMsgId> {
    let id = if raw.starts_with('<') {
        FullMsgId::parse(raw)?.core()
    } else {
        CoreMsgId::new(raw)?
    };
    Ok(id)
}

fn cmd_ingest(config: &Config, path: &Path, group: Option<&str>) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let (store, posts) = open_stores(config)?;
    let processor = ArticleProcessor::new(config.processor.clone());

    let start = Instant::now();
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut input = BufReader::new(file);
    let outcome = processor.devour_article(&store, &NoThumbnailer, &mut input)?;
    let mut post = outcome.commit(&store)?;

    if post.message_id.is_none() {
        anyhow::bail!("{}: article has no Message-ID", path.display());
    }
    if let Some(g) = group {
        if !post.headers.contains("Newsgroups") {
            post.headers.set("Newsgroups", g);
        }
    }
    let number = posts.insert(&post)?;

    let total: u64 = post.files.iter().map(|f| f.size).sum();
    println!("Message-ID:   {}", post.message_id.as_ref().map(|id| id.to_full().to_string()).unwrap_or_default());
    println!("Number:       {number}");
    println!("Title:        {}", post.message.title);
    println!("Text:         {}", format_size(post.message.message.len(), BINARY));
    println!("Attachments:  {} ({})", post.files.len(), format_size(total, BINARY));
    for f in &post.files {
        println!("  {:<72} {:>10}  {}", f.id, format_size(f.size, BINARY), f.content_type);
    }
    println!("Time:         {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn cmd_serve(config: &Config, msgid: &str, mode: CopyMode) -> anyhow::Result<()> {
    let id = parse_msgid(msgid)?;
    let (store, posts) = open_stores(config)?;
    let cache = Arc::new(ArticleCache::new(store, Arc::new(posts)));

    let stdout = std::io::stdout();
    let mut sink = ArticleSink::new(mode, LineResponder::new(stdout.lock()))
        .with_buffer_size(config.cache.read_buffer_size);
    match cache.obtain_by_msgid(&id, &mut sink) {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => {
            let mut out = sink.into_responder().into_inner();
            write!(out, "430 No article with that message-id\r\n")?;
            out.flush()?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_generate(config: &Config, msgid: &str) -> anyhow::Result<()> {
    let id = parse_msgid(msgid)?;
    let (store, posts) = open_stores(config)?;
    let cache = ArticleCache::new(store, Arc::new(posts));
    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    cache.generate_uncached(&id, &mut out)?;
    out.flush()?;
    Ok(())
}

fn cmd_config(config: &Config, write_default: bool) -> anyhow::Result<()> {
    if write_default {
        let path = config::save_config(config)?;
        println!("Wrote {}", path.display());
    } else {
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "boardnews", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}
