use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jsonstash_core::{QueryEngine, QueryRequest, Record, RecordStore, WalStore};
use reqwest::blocking::Client;
use rustyline::DefaultEditor;
use serde_json::Value;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(name = "jsonstash", version, about = "jsonstash dataset store CLI", long_about = None)]
struct Cli {
    /// Data directory for local embedded mode
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Start HTTP server instead of embedded CLI ops
    #[arg(long)]
    serve: bool,

    /// Serve from a volatile in-memory store
    #[arg(long, requires = "serve")]
    memory: bool,

    /// Target server URL (enables network mode)
    #[arg(long, env = "JSONSTASH_URL")]
    server_url: Option<String>,

    /// Address to bind when serving
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a JSON object into a dataset
    Insert {
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        json: String,
    },
    /// Query a dataset, optionally grouping or sorting by a field
    Query {
        #[arg(long)]
        dataset: String,
        #[arg(long)]
        group_by: Option<String>,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        order: Option<String>,
    },
    /// Start interactive shell
    Repl,
}

enum Backend {
    Local {
        engine: QueryEngine,
        store: Arc<WalStore>,
    },
    Remote {
        client: Client,
        base: String,
    },
}

impl Backend {
    fn insert(&self, dataset: &str, record: &Record) -> Result<Value> {
        match self {
            Backend::Local { engine, store } => {
                let resp = engine.insert(dataset, record)?;
                store.flush()?;
                Ok(serde_json::to_value(resp)?)
            }
            Backend::Remote { client, base } => {
                let resp = client
                    .post(format!("{base}/api/dataset/{dataset}/record"))
                    .json(record)
                    .send()?;
                read_response(resp)
            }
        }
    }

    fn query(&self, dataset: &str, request: &QueryRequest) -> Result<Value> {
        match self {
            Backend::Local { engine, .. } => Ok(serde_json::to_value(engine.query(dataset, request)?)?),
            Backend::Remote { client, base } => {
                let resp = client
                    .get(format!("{base}/api/dataset/{dataset}/query"))
                    .query(request)
                    .send()?;
                read_response(resp)
            }
        }
    }
}

fn read_response(resp: reqwest::blocking::Response) -> Result<Value> {
    let status = resp.status();
    let body: Value = resp.json().context("server returned a non-JSON body")?;
    if !status.is_success() {
        let msg = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("request failed");
        bail!("{status}: {msg}");
    }
    Ok(body)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.serve {
        std::env::set_var("JSONSTASH_DATA", cli.data_dir.to_string_lossy().to_string());
        std::env::set_var("JSONSTASH_LISTEN", cli.listen);
        if cli.memory {
            std::env::set_var("JSONSTASH_STORE", "memory");
        }
        let rt = Runtime::new()?;
        return rt.block_on(jsonstash_server::serve());
    }

    let backend = match cli.server_url {
        Some(base) => Backend::Remote {
            client: Client::builder().user_agent("jsonstash-cli").build()?,
            base: base.trim_end_matches('/').to_string(),
        },
        None => {
            let store = Arc::new(WalStore::open(&cli.data_dir)?);
            Backend::Local {
                engine: QueryEngine::new(store.clone()),
                store,
            }
        }
    };

    match cli.command {
        Some(Commands::Insert { dataset, json }) => {
            let record = parse_record(&json)?;
            println!("{}", serde_json::to_string_pretty(&backend.insert(&dataset, &record)?)?);
        }
        Some(Commands::Query {
            dataset,
            group_by,
            sort_by,
            order,
        }) => {
            let request = QueryRequest {
                group_by,
                sort_by,
                order,
            };
            println!("{}", serde_json::to_string_pretty(&backend.query(&dataset, &request)?)?);
        }
        Some(Commands::Repl) => run_repl(&backend)?,
        None => {
            println!("No command given. Use --help for usage, or run the repl subcommand.");
        }
    }
    Ok(())
}

fn parse_record(json: &str) -> Result<Record> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(map),
        _ => bail!("record must be a JSON object"),
    }
}

#[derive(Debug, PartialEq)]
enum ReplCommand {
    Insert { dataset: String, record: Record },
    Query { dataset: String, request: QueryRequest },
    Quit,
    Empty,
}

fn parse_repl_line(line: &str) -> Result<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
        return Ok(ReplCommand::Quit);
    }
    let mut parts = line.splitn(3, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    match cmd {
        "insert" => {
            let (Some(dataset), Some(json)) = (parts.next(), parts.next()) else {
                bail!("usage: insert <dataset> {{json}}");
            };
            Ok(ReplCommand::Insert {
                dataset: dataset.to_string(),
                record: parse_record(json.trim())?,
            })
        }
        "query" => {
            let Some(dataset) = parts.next() else {
                bail!("usage: query <dataset> [group=F] [sort=F] [order=asc|desc]");
            };
            let mut request = QueryRequest::default();
            for opt in parts.next().unwrap_or("").split_whitespace() {
                match opt.split_once('=') {
                    Some(("group", f)) => request.group_by = Some(f.to_string()),
                    Some(("sort", f)) => request.sort_by = Some(f.to_string()),
                    Some(("order", o)) => request.order = Some(o.to_string()),
                    _ => bail!("unknown query option '{opt}'"),
                }
            }
            Ok(ReplCommand::Query {
                dataset: dataset.to_string(),
                request,
            })
        }
        other => bail!("unknown command '{other}'"),
    }
}

fn run_repl(backend: &Backend) -> Result<()> {
    let mut rl = DefaultEditor::new().ok();
    println!("jsonstash shell. Commands: insert <dataset> <json>, query <dataset> [group=F] [sort=F] [order=asc|desc], quit.");
    loop {
        let prompt = "jsonstash> ";
        let line = if let Some(ref mut editor) = rl {
            match editor.readline(prompt) {
                Ok(l) => {
                    let _ = editor.add_history_entry(l.as_str());
                    l
                }
                Err(_) => break,
            }
        } else {
            print!("{prompt}");
            io::stdout().flush()?;
            let mut buf = String::new();
            if io::stdin().read_line(&mut buf)? == 0 {
                break;
            }
            buf
        };
        let start = Instant::now();
        let out = match parse_repl_line(&line) {
            Ok(ReplCommand::Quit) => break,
            Ok(ReplCommand::Empty) => continue,
            Ok(ReplCommand::Insert { dataset, record }) => backend.insert(&dataset, &record),
            Ok(ReplCommand::Query { dataset, request }) => backend.query(&dataset, &request),
            Err(e) => Err(e),
        };
        match out.and_then(|v| Ok(serde_json::to_string_pretty(&v)?)) {
            Ok(text) => println!("{text}\n({:.2?})", start.elapsed()),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_insert_with_spaces_in_json() {
        let cmd = parse_repl_line(r#"insert people {"name": "John Smith", "age": 30}"#).unwrap();
        assert_eq!(
            cmd,
            ReplCommand::Insert {
                dataset: "people".into(),
                record: json!({"name": "John Smith", "age": 30})
                    .as_object()
                    .cloned()
                    .unwrap(),
            }
        );
    }

    #[test]
    fn parses_query_options() {
        let cmd = parse_repl_line("query people sort=age order=desc").unwrap();
        assert_eq!(
            cmd,
            ReplCommand::Query {
                dataset: "people".into(),
                request: QueryRequest::sorted("age", "desc"),
            }
        );
        let cmd = parse_repl_line("query people group=city").unwrap();
        assert_eq!(
            cmd,
            ReplCommand::Query {
                dataset: "people".into(),
                request: QueryRequest::grouped("city"),
            }
        );
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(parse_repl_line("insert people [1,2]").is_err());
        assert!(parse_repl_line("insert people").is_err());
        assert!(parse_repl_line("query people limit=3").is_err());
        assert!(parse_repl_line("drop people").is_err());
        assert_eq!(parse_repl_line("  ").unwrap(), ReplCommand::Empty);
        assert_eq!(parse_repl_line("EXIT").unwrap(), ReplCommand::Quit);
    }
}
