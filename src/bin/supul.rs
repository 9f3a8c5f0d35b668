//! CLI front-end (SPEC_FULL.md §2.I): binds every public `Engine`/`project::*`
//! call 1:1 to a subcommand. Stands in for the out-of-scope HTTP service,
//! grounded on the teacher's own thin `src/bin/*.rs` binaries that call
//! straight into the library and do little else.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use supul::{project, value::FieldType, Category, Engine, ReportOptions};

#[derive(Parser)]
#[command(name = "supul", about = "incremental decision-tree classifier with persistent model state")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// project.* scaffolding
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// model.insert_chunk_csv
    InsertChunkCsv {
        base_dir: PathBuf,
        csv_path: PathBuf,
    },
    /// model.update
    Update {
        base_dir: PathBuf,
    },
    /// model.rebuild
    Rebuild {
        base_dir: PathBuf,
    },
    /// model.predict, features given as name=value pairs
    Predict {
        base_dir: PathBuf,
        #[arg(value_parser = parse_key_value)]
        features: Vec<(String, String)>,
    },
    /// report.json
    Report {
        base_dir: PathBuf,
        #[arg(long, value_delimiter = ',', default_value = "global,chunk_history,confusion_matrix,generation_history")]
        categories: Vec<String>,
        #[arg(long)]
        datetime_as_index: bool,
    },
    /// misc.version
    Version,
}

#[derive(Subcommand)]
enum ProjectAction {
    Create { base_dir: PathBuf },
    SetProperty { base_dir: PathBuf, name: String, value: String },
    AddField { base_dir: PathBuf, name: String, #[arg(value_parser = parse_field_type)] field_type: FieldType },
    X { base_dir: PathBuf, names: Vec<String> },
    Y { base_dir: PathBuf, name: String },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())).ok_or_else(|| format!("expected name=value, got {s:?}"))
}

fn parse_field_type(s: &str) -> Result<FieldType, String> {
    match s.to_ascii_uppercase().as_str() {
        "INTEGER" => Ok(FieldType::Integer),
        "BIGINT" => Ok(FieldType::BigInt),
        "SMALLINT" => Ok(FieldType::SmallInt),
        "REAL" => Ok(FieldType::Real),
        "TEXT" => Ok(FieldType::Text),
        "TEXT_ID" | "TEXTID" => Ok(FieldType::TextId),
        other => Err(format!("unknown field type {other:?}")),
    }
}

fn parse_category(s: &str) -> Result<Category, String> {
    match s {
        "global" => Ok(Category::Global),
        "chunk_history" => Ok(Category::ChunkHistory),
        "confusion_matrix" => Ok(Category::ConfusionMatrix),
        "generation_history" => Ok(Category::GenerationHistory),
        other => Err(format!("unknown report category {other:?}")),
    }
}

fn init_logging() {
    let config = simplelog::ConfigBuilder::new().set_location_level(log::LevelFilter::Off).set_time_level(log::LevelFilter::Off).build();
    let _ = simplelog::TermLogger::init(log::LevelFilter::Info, config, simplelog::TerminalMode::Mixed, simplelog::ColorChoice::Auto);
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Project { action } => run_project_action(action)?,
        Command::InsertChunkCsv { base_dir, csv_path } => {
            let engine = Engine::open(&base_dir)?;
            engine.insert_chunk_csv(&csv_path)?;
            engine.close()?;
            println!("{}", serde_json::json!({"ok": true}));
        }
        Command::Update { base_dir } => {
            let engine = Engine::open(&base_dir)?;
            let did_work = engine.update()?;
            engine.close()?;
            println!("{}", serde_json::json!({"ok": true, "did_work": did_work}));
        }
        Command::Rebuild { base_dir } => {
            let engine = Engine::open(&base_dir)?;
            let did_work = engine.rebuild()?;
            engine.close()?;
            println!("{}", serde_json::json!({"ok": true, "did_work": did_work}));
        }
        Command::Predict { base_dir, features } => {
            let engine = Engine::open(&base_dir)?;
            let x: HashMap<String, String> = features.into_iter().collect();
            let result = engine.predict(&x);
            engine.close()?;
            println!("{result}");
        }
        Command::Report { base_dir, categories, datetime_as_index } => {
            let engine = Engine::open(&base_dir)?;
            let categories: Vec<Category> = categories.iter().map(|s| parse_category(s)).collect::<Result<_, _>>().map_err(anyhow::Error::msg)?;
            let report = engine.report_json(&categories, ReportOptions { datetime_as_index })?;
            engine.close()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Version => println!("{}", supul::misc::version()),
    }

    Ok(())
}

fn run_project_action(action: ProjectAction) -> supul::Result<()> {
    match action {
        ProjectAction::Create { base_dir } => project::create(&base_dir),
        ProjectAction::SetProperty { base_dir, name, value } => project::set_property(&base_dir, &name, &value),
        ProjectAction::AddField { base_dir, name, field_type } => project::add_field(&base_dir, &name, field_type),
        ProjectAction::X { base_dir, names } => project::x(&base_dir, &names),
        ProjectAction::Y { base_dir, name } => project::y(&base_dir, &name),
    }
}
