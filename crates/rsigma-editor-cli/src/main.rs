use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use rsigma_editor::validate::validate_condition;
use rsigma_editor::{
    Clause, Edit, Editor, EditorConfig, EditorError, EditorState, ErrorMap, RawEditorConfig,
    Upload, ValidationError, decompose, import_upload, parse_clauses, serialize, try_parse,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "rsigma-editor")]
#[command(about = "Edit, validate, and format Sigma detection blocks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: nearest .rsigma-editor.yml above the input)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Prefix for generated selection names
    #[arg(long, global = true)]
    prefix: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a detection block and print the document as JSON
    Parse {
        /// Path to a detection block YAML file, or `-` for stdin
        path: PathBuf,

        /// Pretty-print JSON output
        #[arg(short, long, default_value_t = true)]
        pretty: bool,
    },

    /// Re-emit a detection block in canonical form
    Fmt {
        /// Path to a detection block YAML file, or `-` for stdin
        path: PathBuf,
    },

    /// Validate a detection block and report every error
    Validate {
        /// Path to a detection block YAML file, or `-` for stdin
        path: PathBuf,
    },

    /// Split a condition into clauses and check its selection names
    Condition {
        /// The condition expression
        expr: String,

        /// Comma-separated selection names the condition may reference
        #[arg(short, long, value_delimiter = ',')]
        selections: Vec<String>,
    },

    /// Turn a CSV or plain-text file into a list of values
    Import {
        /// Path to the file to import
        path: PathBuf,

        /// Declared MIME type (text/csv or text/plain)
        #[arg(short, long)]
        mime: String,

        /// CSV column delimiter
        #[arg(short, long)]
        delimiter: Option<String>,
    },

    /// Apply a JSON list of edits and print the resulting detection block
    Edit {
        /// Path to a detection block YAML file, or `-` for stdin
        path: PathBuf,

        /// JSON file holding an array of edits
        #[arg(short, long)]
        edits: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let overrides = RawEditorConfig {
        selection_prefix: cli.prefix.clone(),
        ..Default::default()
    };

    match cli.command {
        Commands::Parse { path, pretty } => {
            let config = load_config(cli.config.as_deref(), &path, &overrides);
            cmd_parse(&path, &config, pretty);
        }
        Commands::Fmt { path } => {
            let config = load_config(cli.config.as_deref(), &path, &overrides);
            cmd_fmt(&path, &config);
        }
        Commands::Validate { path } => {
            let config = load_config(cli.config.as_deref(), &path, &overrides);
            cmd_validate(&path, &config);
        }
        Commands::Condition { expr, selections } => cmd_condition(&expr, &selections),
        Commands::Import {
            path,
            mime,
            delimiter,
        } => {
            let mut overrides = overrides;
            overrides.import.delimiter = delimiter;
            let config = load_config(cli.config.as_deref(), &path, &overrides);
            cmd_import(&path, &mime, &config);
        }
        Commands::Edit { path, edits } => {
            let config = load_config(cli.config.as_deref(), &path, &overrides);
            cmd_edit(&path, &edits, config);
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_parse(path: &Path, config: &EditorConfig, pretty: bool) {
    let text = read_input(path);
    match try_parse(&text, &config.selection_prefix) {
        Ok(doc) => print_json(&doc, pretty),
        Err(e) => {
            eprintln!("Error parsing {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn cmd_fmt(path: &Path, config: &EditorConfig) {
    let text = read_input(path);
    let doc = match try_parse(&text, &config.selection_prefix) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error parsing {}: {e}", path.display());
            process::exit(1);
        }
    };
    match serialize(&doc) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("Error serializing {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn cmd_validate(path: &Path, config: &EditorConfig) {
    let text = read_input(path);
    let doc = match try_parse(&text, &config.selection_prefix) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error parsing {}: {e}", path.display());
            process::exit(1);
        }
    };

    let state = Editor::new(config.clone()).open(doc).touch_all();
    let errors = state.visible_errors();
    if errors.is_empty() {
        println!("{}: OK", path.display());
        return;
    }

    print_json(&errors, true);
    eprintln!("{} error(s) in {}", errors.len(), path.display());
    process::exit(1);
}

#[derive(Serialize)]
struct ConditionReport {
    clauses: Vec<Clause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ValidationError>,
}

fn cmd_condition(expr: &str, selections: &[String]) {
    let clauses = match parse_clauses(expr) {
        Ok(clauses) => clauses,
        Err(_) => decompose(expr, selections),
    };
    let error = validate_condition(expr, selections);
    let failed = error.is_some();

    print_json(&ConditionReport { clauses, error }, true);
    if failed {
        process::exit(1);
    }
}

fn cmd_import(path: &Path, mime: &str, config: &EditorConfig) {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {e}", path.display());
            process::exit(1);
        }
    };

    match import_upload(&Upload::new(bytes, mime), &config.import) {
        Ok(values) => print_json(&values, true),
        Err(e) => {
            eprintln!("{}: {e}", e.code());
            process::exit(1);
        }
    }
}

#[derive(Serialize)]
struct EditReport<'a> {
    condition: &'a str,
    valid: bool,
    errors: ErrorMap,
}

fn cmd_edit(path: &Path, edits_path: &Path, config: EditorConfig) {
    let text = read_input(path);
    let edits: Vec<Edit> = match std::fs::read_to_string(edits_path)
        .map_err(EditorError::from)
        .and_then(|s| serde_json::from_str(&s).map_err(EditorError::from))
    {
        Ok(edits) => edits,
        Err(e) => {
            eprintln!("Error loading edits from {}: {e}", edits_path.display());
            process::exit(1);
        }
    };

    let editor = Editor::new(config);
    let state = match editor.apply_all(&editor.load(&text), edits) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Edit failed: {e}");
            process::exit(1);
        }
    };
    if let Some(rejected) = &state.import_error {
        eprintln!("{}: {rejected}", rejected.code());
    }

    print_yaml(&state);
    let errors = state.visible_errors();
    if !errors.is_empty() {
        print_json_stderr(&EditReport {
            condition: &state.document.condition,
            valid: state.is_valid(),
            errors,
        });
        process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Config file (explicit or discovered), overlaid with command-line flags.
fn load_config(
    explicit: Option<&Path>,
    input: &Path,
    overrides: &RawEditorConfig,
) -> EditorConfig {
    let found = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None if is_stdin(input) => std::env::current_dir()
            .ok()
            .and_then(|dir| EditorConfig::find_in_ancestors(&dir)),
        None => EditorConfig::find_in_ancestors(input),
    };

    let mut config = match &found {
        Some(p) => match EditorConfig::load(p) {
            Ok(c) => {
                log::info!("loaded config from {}", p.display());
                c
            }
            Err(e) => {
                eprintln!("Error loading config {}: {e}", p.display());
                process::exit(1);
            }
        },
        None => EditorConfig::default(),
    };

    if let Err(e) = config.merge(overrides) {
        eprintln!("Invalid option: {e}");
        process::exit(1);
    }
    config
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn read_input(path: &Path) -> String {
    let result = if is_stdin(path) {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input).map(|_| input)
    } else {
        std::fs::read_to_string(path)
    };
    match result {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error reading {}: {e}", path.display());
            process::exit(1);
        }
    }
}

fn print_yaml(state: &EditorState) {
    match state.to_yaml() {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("YAML serialization error: {e}");
            process::exit(1);
        }
    }
}

fn print_json(value: &impl Serialize, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match json {
        Ok(j) => println!("{j}"),
        Err(e) => {
            eprintln!("JSON serialization error: {e}");
            process::exit(1);
        }
    }
}

fn print_json_stderr(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(j) => eprintln!("{j}"),
        Err(e) => {
            eprintln!("JSON serialization error: {e}");
            process::exit(1);
        }
    }
}
