use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use jsonschema_form_core::{
    FieldPath, LiveValueStore, Session, SessionOptions, ValidationOutcome,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "jsonschema-form")]
#[command(about = "Inspect the form tree of any JSON Schema and collect form input into validated JSON")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the field descriptor tree of a schema
    Tree {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Apply stored values to a schema's form and print the collected document
    Collect {
        #[command(flatten)]
        common: CommonArgs,

        /// JSON object mapping field paths to values (strings/booleans) or
        /// node state objects ({"variant": n}, {"count": n}, {"key": "name"})
        #[arg(long)]
        values: PathBuf,
    },

    /// Print the effective schema at a field path
    Resolve {
        #[command(flatten)]
        common: CommonArgs,

        /// Field path, e.g. `root.items[0].name`
        #[arg(default_value = "root")]
        path: String,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Schema file path or http(s) URL
    schema: String,

    /// Output file (defaults to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    /// Nesting depth beyond which fields are replaced by a message
    #[arg(long, default_value_t = 50)]
    max_depth: usize,

    /// Upper bound on the number of array slots shown initially
    #[arg(long, default_value_t = 5)]
    initial_slot_cap: usize,

    /// HTTP timeout for fetching schemas, in seconds
    #[arg(long, default_value_t = 10)]
    fetch_timeout_secs: u64,

    /// Skip compiling a validator
    #[arg(long)]
    no_validate: bool,
}

impl CommonArgs {
    fn options(&self) -> SessionOptions {
        // All fields set explicitly; clippy enforces exhaustiveness
        SessionOptions {
            max_depth: self.max_depth,
            initial_slot_cap: self.initial_slot_cap,
            fetch_timeout_secs: self.fetch_timeout_secs,
            validate: !self.no_validate,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Pretty,
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: logs go to stderr so stdout stays clean for JSON
    let log_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Tree { common } => {
            let session = open_session(&common).await?;
            let tree = session
                .descriptor_tree()
                .context("Failed to build descriptor tree")?;
            write_json(&tree, common.output.as_ref(), common.format)?;
        }
        Commands::Collect { common, values } => {
            let mut session = open_session(&common).await?;
            *session.store_mut() = read_values(&values)?;

            let document = session.collect().context("Collection failed")?;
            let outcome = session.validate().context("Validation failed")?;

            if let ValidationOutcome::Invalid(messages) = &outcome {
                for message in messages {
                    eprintln!("Invalid: {}", message);
                }
            }

            let report = json!({
                "document": document,
                "validation": outcome,
            });
            write_json(&report, common.output.as_ref(), common.format)?;

            if matches!(outcome, ValidationOutcome::Invalid(_)) {
                std::process::exit(1);
            }
        }
        Commands::Resolve { common, path } => {
            let session = open_session(&common).await?;
            let path: FieldPath = path
                .parse()
                .with_context(|| format!("Invalid field path: {}", path))?;
            let node = session
                .resolve_at(&path)
                .with_context(|| format!("Failed to resolve {}", path))?;
            write_json(&node, common.output.as_ref(), common.format)?;
        }
    }

    Ok(())
}

/// Create a session and load the schema from a file or URL.
async fn open_session(common: &CommonArgs) -> Result<Session> {
    let mut session = Session::new(common.options()).context("Failed to create session")?;

    if common.schema.starts_with("http://") || common.schema.starts_with("https://") {
        session
            .load_url(&common.schema)
            .await
            .with_context(|| format!("Failed to load schema from: {}", common.schema))?;
    } else {
        let text = fs::read_to_string(&common.schema)
            .with_context(|| format!("Failed to open input file: {}", common.schema))?;
        session
            .load_text(&text)
            .await
            .with_context(|| format!("Failed to parse schema from: {}", common.schema))?;
    }

    Ok(session)
}

/// Read a values file into a store. Bare strings and booleans are leaf
/// values; objects are node states.
fn read_values(path: &PathBuf) -> Result<LiveValueStore> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to open values file: {}", path.display()))?;
    let raw: BTreeMap<String, Value> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse values from: {}", path.display()))?;

    let mut states = Map::new();
    for (key, value) in raw {
        let state = match value {
            Value::String(_) | Value::Bool(_) => json!({ "value": value }),
            Value::Object(_) => value,
            other => anyhow::bail!(
                "Value for {} must be a string, boolean or object, got {}",
                key,
                other
            ),
        };
        states.insert(key, state);
    }

    serde_json::from_value(Value::Object(states))
        .with_context(|| format!("Invalid values in: {}", path.display()))
}

fn write_json<T: serde::Serialize>(
    val: &T,
    path: Option<&PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let mut writer: Box<dyn Write> = if let Some(p) = path {
        let file = File::create(p)
            .with_context(|| format!("Failed to create output file: {}", p.display()))?;
        Box::new(BufWriter::new(file))
    } else {
        Box::new(BufWriter::new(io::stdout()))
    };

    match format {
        OutputFormat::Pretty => {
            serde_json::to_writer_pretty(&mut writer, val).context("Failed to write JSON")?;
        }
        OutputFormat::Compact => {
            serde_json::to_writer(&mut writer, val).context("Failed to write JSON")?;
        }
    }

    // Ensure trailing newline
    writeln!(writer).context("Failed to write trailing newline")?;
    writer.flush().context("Failed to flush output")?;

    Ok(())
}
