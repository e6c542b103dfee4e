//! kvport - command-line front end
//!
//! Opens one backend from flags and runs a single `get`, `set`, `del` or
//! `reset` against it.

#[cfg(feature = "mysql")]
use kvport::backends::sql::{MysqlConfig, MysqlEngine};
#[cfg(feature = "postgres")]
use kvport::backends::sql::{PostgresConfig, PostgresEngine};
#[cfg(feature = "sqlite")]
use kvport::backends::sql::{SqliteConfig, SqliteEngine};
use kvport::backends::{
    MemcacheConfig, MemcacheStore, MemoryConfig, MemoryStore, RedisConfig, RedisStore, SqlConfig,
    SqlStore,
};
use kvport::{Lookup, Storage, Value};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line configuration
struct Config {
    backend: String,
    url: Option<String>,
    namespace: String,
    ttl: Duration,
    shape: Shape,
    command: Vec<String>,
}

/// How values are parsed on `set` and printed on `get`
#[derive(Clone, Copy)]
enum Shape {
    String,
    Bool,
    I64,
    U64,
    F64,
    Uuid,
    Json,
}

impl Shape {
    fn parse(name: &str) -> anyhow::Result<Self> {
        Ok(match name {
            "string" | "str" => Shape::String,
            "bool" => Shape::Bool,
            "i64" | "int" => Shape::I64,
            "u64" => Shape::U64,
            "f64" | "float" => Shape::F64,
            "uuid" => Shape::Uuid,
            "json" => Shape::Json,
            other => anyhow::bail!("unknown value type: {}", other),
        })
    }

    /// Parses command-line text into a value of this shape.
    fn to_value(self, text: &str) -> anyhow::Result<Value> {
        // Text goes through the same conversions a reader would apply
        let lookup = Lookup::hit(Value::Str(text.to_string()));
        let value = match self {
            Shape::String => Value::Str(text.to_string()),
            Shape::Bool => Value::from(lookup.bool()?),
            Shape::I64 => Value::from(lookup.i64()?),
            Shape::U64 => Value::from(lookup.u64()?),
            Shape::F64 => Value::from(lookup.f64()?),
            Shape::Uuid => Value::from(lookup.uuid()?),
            Shape::Json => {
                let json: serde_json::Value = serde_json::from_str(text)?;
                Value::from(json)
            }
        };
        Ok(value)
    }

    fn render(self, lookup: &Lookup) -> anyhow::Result<Option<String>> {
        Ok(match self {
            Shape::String => lookup.string()?,
            Shape::Bool => lookup.bool()?.map(|v| v.to_string()),
            Shape::I64 => lookup.i64()?.map(|v| v.to_string()),
            Shape::U64 => lookup.u64()?.map(|v| v.to_string()),
            Shape::F64 => lookup.f64()?.map(|v| v.to_string()),
            Shape::Uuid => lookup.uuid()?.map(|v| v.to_string()),
            Shape::Json => lookup.value().map(|v| v.to_json().to_string()),
        })
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config {
            backend: "memory".to_string(),
            url: None,
            namespace: String::new(),
            ttl: Duration::ZERO,
            shape: Shape::String,
            command: Vec::new(),
        };

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow::anyhow!("{} requires a value", flag))
            };
            match arg.as_str() {
                "--backend" | "-b" => config.backend = value("--backend")?,
                "--url" | "-u" => config.url = Some(value("--url")?),
                "--namespace" | "-n" => config.namespace = value("--namespace")?,
                "--ttl" | "-t" => config.ttl = parse_duration(&value("--ttl")?)?,
                "--as" => config.shape = Shape::parse(&value("--as")?)?,
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("kvport version {}", kvport::VERSION);
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => anyhow::bail!("unknown argument: {}", flag),
                _ => config.command.push(arg),
            }
        }

        Ok(config)
    }
}

/// Parses `500ms`, `2s`, `5m`, `1h` or a bare number of seconds.
fn parse_duration(text: &str) -> anyhow::Result<Duration> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration: {}", text))?;

    let seconds = match unit {
        "ms" => number / 1000.0,
        "" | "s" => number,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        _ => anyhow::bail!("invalid duration unit: {}", unit),
    };
    Ok(Duration::try_from_secs_f64(seconds)?)
}

fn print_help() {
    println!(
        r#"
kvport - one key-value contract, many backends

USAGE:
    kvport [OPTIONS] <COMMAND>

COMMANDS:
    get <key>              Print a value (exit code 1 on a miss)
    set <key> <value>      Store a value
    del <key> [key ...]    Delete keys
    reset                  Remove every key in the namespace

OPTIONS:
    -b, --backend <NAME>     memory, redis, memcache, sqlite, postgres, mysql
                             (default: memory)
    -u, --url <URL>          Connection URL, server list or database path
    -n, --namespace <NAME>   Namespace (default: global)
    -t, --ttl <DURATION>     Expiry for set, e.g. 500ms, 30s, 5m (default: none)
        --as <TYPE>          string, bool, i64, u64, f64, uuid, json
                             (default: string)
    -v, --version            Print version information
    -h, --help               Print this help message

EXAMPLES:
    kvport -b redis -u redis://127.0.0.1:6379/0 -n sessions set 42 alice
    kvport -b sqlite -u ./kv.sqlite3 --as i64 --ttl 1h set visits 41
    kvport -b memcache -u 127.0.0.1:11211 --as json get profile
"#
    );
}

#[cfg(any(feature = "sqlite", feature = "postgres", feature = "mysql"))]
fn sql_config(config: &Config) -> SqlConfig {
    SqlConfig {
        namespace: config.namespace.clone(),
        ..Default::default()
    }
}

/// Opens the configured backend.
async fn open(config: &Config) -> anyhow::Result<Box<dyn Storage>> {
    let namespace = config.namespace.clone();

    let store: Box<dyn Storage> = match config.backend.as_str() {
        "memory" => Box::new(MemoryStore::new(MemoryConfig {
            namespace,
            ..Default::default()
        })),
        "redis" => {
            let base = match &config.url {
                Some(url) => RedisConfig::from_url(url.clone()),
                None => RedisConfig::default(),
            };
            Box::new(RedisStore::new(RedisConfig { namespace, ..base }).await?)
        }
        "memcache" | "memcached" => {
            let base = match &config.url {
                Some(servers) => MemcacheConfig::with_servers(servers.clone()),
                None => MemcacheConfig::default(),
            };
            Box::new(MemcacheStore::new(MemcacheConfig { namespace, ..base }).await?)
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let mut engine = SqliteConfig::default();
            if let Some(path) = &config.url {
                engine.path = path.into();
            }
            Box::new(SqlStore::with_engine(SqliteEngine::open(&engine)?, sql_config(config)).await?)
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let engine = match &config.url {
                Some(url) => PostgresConfig::from_url(url.clone()),
                None => PostgresConfig::default(),
            };
            Box::new(SqlStore::with_engine(PostgresEngine::connect(&engine)?, sql_config(config)).await?)
        }
        #[cfg(feature = "mysql")]
        "mysql" => {
            let engine = match &config.url {
                Some(url) => MysqlConfig::from_url(url.clone()),
                None => MysqlConfig::default(),
            };
            Box::new(SqlStore::with_engine(MysqlEngine::connect(&engine)?, sql_config(config)).await?)
        }
        other => anyhow::bail!("unsupported backend: {} (is its feature enabled?)", other),
    };

    Ok(store)
}

/// Runs one command. Returns false on a `get` miss.
async fn run(store: &dyn Storage, config: &Config) -> anyhow::Result<bool> {
    let args: Vec<&str> = config.command.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["get", key] => {
            let lookup = store.get(key).await?;
            match config.shape.render(&lookup)? {
                Some(text) => println!("{}", text),
                None => return Ok(false),
            }
        }
        ["set", key, value] => {
            let value = config.shape.to_value(value)?;
            store.set(key, value, config.ttl).await?;
            debug!(key = %key, ttl = ?config.ttl, "Stored");
        }
        ["del", keys @ ..] => store.delete(keys).await?,
        ["reset"] => store.reset().await?,
        [] => anyhow::bail!("no command given (see --help)"),
        _ => anyhow::bail!("unknown command: {} (see --help)", args.join(" ")),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;

    // Set up logging; stdout is reserved for values
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store = open(&config).await?;
    let result = run(store.as_ref(), &config).await;
    store.close().await?;

    if !result? {
        std::process::exit(1);
    }
    Ok(())
}
