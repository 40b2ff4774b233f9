//! Interactive command loop over a single blocktree index file.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use blocktree::common::config::{DEFAULT_MAX_KEYS, ENV_MAX_BLOCKS, ENV_MAX_KEYS, MAX_BLOCKS};
use blocktree::{hash_str, BTree, Key, TreeConfig};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "blocktree-cli",
    version,
    about = "Interactive shell for a blocktree index file"
)]
struct Cli {
    #[arg(value_name = "DB", help = "Index file; created if it does not exist")]
    db_path: PathBuf,

    #[arg(
        long,
        env = ENV_MAX_KEYS,
        default_value_t = DEFAULT_MAX_KEYS,
        help = "Routing keys per internal node (new files only)"
    )]
    max_keys: usize,

    #[arg(
        long,
        env = ENV_MAX_BLOCKS,
        default_value_t = MAX_BLOCKS,
        help = "Block capacity of the file (new files only)"
    )]
    max_blocks: u32,

    #[arg(long, help = "Parse keys as unsigned integers instead of hashing them")]
    raw_keys: bool,
}

const HELP: &str = "\
commands:
  insert <key> [value]  add a key (value defaults to 0)
  search <key>          print the leaf block holding key
  get <key>             print the value stored with key
  delete <key>          remove one leaf holding key
  print                 dump the tree
  min | max | height    tree queries
  validate              check every structural invariant
  stats                 block store counters
  help                  this text
  quit                  flush and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Insert { key: String, value: u64 },
    Search(String),
    Get(String),
    Delete(String),
    Print,
    Min,
    Max,
    Height,
    Validate,
    Stats,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Ok(None);
        };
        let mut arg = |what: &str| {
            parts
                .next()
                .map(str::to_string)
                .ok_or_else(|| format!("{name}: missing {what}"))
        };

        let cmd = match name.to_ascii_lowercase().as_str() {
            "insert" | "i" => {
                let key = arg("key")?;
                let value = match arg("value") {
                    Ok(raw) => raw
                        .parse()
                        .map_err(|e| format!("insert: bad value {raw:?}: {e}"))?,
                    Err(_) => 0,
                };
                Command::Insert { key, value }
            }
            "search" | "s" => Command::Search(arg("key")?),
            "get" | "g" => Command::Get(arg("key")?),
            "delete" | "d" => Command::Delete(arg("key")?),
            "print" | "p" => Command::Print,
            "min" => Command::Min,
            "max" => Command::Max,
            "height" => Command::Height,
            "validate" => Command::Validate,
            "stats" => Command::Stats,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command {other:?} (try `help`)")),
        };
        Ok(Some(cmd))
    }
}

/// Turns user input into tree keys.
struct KeyParser {
    raw: bool,
}

impl KeyParser {
    fn key(&self, input: &str) -> Result<Key, String> {
        if self.raw {
            input
                .parse()
                .map_err(|e| format!("bad key {input:?}: {e}"))
        } else {
            Ok(hash_str(input))
        }
    }
}

fn format_key(key: Option<Key>) -> String {
    key.map_or_else(|| "(empty)".to_string(), |k| k.to_string())
}

/// Execute one command. Returns `false` once the loop should stop.
fn execute(
    tree: &mut BTree,
    keys: &KeyParser,
    cmd: Command,
    out: &mut impl Write,
) -> Result<bool, Box<dyn Error>> {
    match cmd {
        Command::Insert { key, value } => {
            let k = keys.key(&key)?;
            let leaf = tree.insert_value(k, value)?;
            writeln!(out, "inserted {k} at block {}", leaf.0)?;
        }
        Command::Search(key) => {
            let k = keys.key(&key)?;
            match tree.search(k)? {
                Some(leaf) => writeln!(out, "found {k} at block {}", leaf.0)?,
                None => writeln!(out, "{k} not found")?,
            }
        }
        Command::Get(key) => {
            let k = keys.key(&key)?;
            match tree.get(k)? {
                Some(value) => writeln!(out, "{k} = {value}")?,
                None => writeln!(out, "{k} not found")?,
            }
        }
        Command::Delete(key) => {
            let k = keys.key(&key)?;
            if tree.delete(k)? {
                writeln!(out, "deleted {k}")?;
            } else {
                writeln!(out, "{k} not found")?;
            }
        }
        Command::Print => write!(out, "{}", tree.dump()?)?,
        Command::Min => writeln!(out, "min: {}", format_key(tree.minimum()?))?,
        Command::Max => writeln!(out, "max: {}", format_key(tree.maximum()?))?,
        Command::Height => writeln!(out, "height: {}", tree.height()?)?,
        Command::Validate => writeln!(out, "ok: {}", tree.validate()?)?,
        Command::Stats => {
            writeln!(
                out,
                "root: block {}  max_keys: {}  blocks in use: {}",
                tree.root().0,
                tree.max_keys(),
                tree.allocated_blocks()
            )?;
            writeln!(out, "{}", tree.store_stats())?;
        }
        Command::Help => writeln!(out, "{HELP}")?,
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = TreeConfig::new(cli.max_keys)?.with_max_blocks(cli.max_blocks)?;
    let mut tree = BTree::open_or_create(&cli.db_path, config)?;
    info!(
        path = %cli.db_path.display(),
        max_keys = tree.max_keys(),
        "opened index"
    );

    let keys = KeyParser { raw: cli.raw_keys };
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    write!(stdout, "> ")?;
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let keep_going = match Command::parse(&line) {
            Ok(Some(cmd)) => match execute(&mut tree, &keys, cmd, &mut stdout) {
                Ok(keep_going) => keep_going,
                Err(e) => {
                    writeln!(stdout, "error: {e}")?;
                    true
                }
            },
            Ok(None) => true,
            Err(msg) => {
                writeln!(stdout, "{msg}")?;
                true
            }
        };
        if !keep_going {
            break;
        }
        write!(stdout, "> ")?;
        stdout.flush()?;
    }

    tree.flush()?;
    info!("flushed index");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blocktree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(
            Command::parse("insert /etc/hosts 7").unwrap(),
            Some(Command::Insert {
                key: "/etc/hosts".into(),
                value: 7
            })
        );
        assert_eq!(
            Command::parse("i 5").unwrap(),
            Some(Command::Insert {
                key: "5".into(),
                value: 0
            })
        );
        assert_eq!(Command::parse("  DELETE x ").unwrap(), Some(Command::Delete("x".into())));
        assert_eq!(Command::parse("q").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("search").is_err());
        assert!(Command::parse("insert k notanumber").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }

    #[test]
    fn test_key_parser() {
        let raw = KeyParser { raw: true };
        assert_eq!(raw.key("42").unwrap(), 42);
        assert!(raw.key("-1").is_err());

        let hashed = KeyParser { raw: false };
        assert_eq!(hashed.key("").unwrap(), 137);
        assert_eq!(hashed.key("42").unwrap(), hash_str("42"));
    }

    #[test]
    fn test_execute_session() {
        let dir = tempdir().unwrap();
        let mut tree = BTree::create(dir.path().join("cli.idx"), TreeConfig::default()).unwrap();
        let keys = KeyParser { raw: true };
        let mut out = Vec::new();

        for line in ["insert 10 1", "insert 20 2", "insert 30 3", "get 20", "delete 10", "min"] {
            let cmd = Command::parse(line).unwrap().unwrap();
            assert!(execute(&mut tree, &keys, cmd, &mut out).unwrap());
        }
        assert!(!execute(&mut tree, &keys, Command::Quit, &mut out).unwrap());

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("20 = 2"));
        assert!(text.contains("deleted 10"));
        assert!(text.contains("min: 20"));
    }
}
