use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use packsmith_api::{
    AddStickerRequest, CreatePackageRequest, PacksmithApi, PacksmithConfig, UpdateMetadataRequest,
};
use packsmith_core::try_hash_file;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "pks")]
#[command(about = "Packsmith sticker pack CLI")]
struct Cli {
    #[arg(long, global = true, env = "PACKSMITH_DB")]
    db: Option<PathBuf>,

    #[arg(long, global = true, env = "PACKSMITH_FILES_DIR")]
    files_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    Pack {
        #[command(subcommand)]
        command: PackCommand,
    },
    Sticker {
        #[command(subcommand)]
        command: StickerCommand,
    },
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },
    Files {
        #[command(subcommand)]
        command: FilesCommand,
    },
    Provider {
        #[command(subcommand)]
        command: ProviderCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum PackCommand {
    Create(PackCreateArgs),
    List,
    Show(IdentifierArgs),
    Update(PackUpdateArgs),
    SetTray(PackSetTrayArgs),
    Delete(IdentifierArgs),
}

#[derive(Debug, Args)]
struct IdentifierArgs {
    #[arg(long)]
    identifier: String,
}

#[derive(Debug, Args)]
struct PackCreateArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    author: String,
    #[arg(long, default_value = "")]
    publisher_email: String,
    #[arg(long, default_value = "")]
    publisher_website: String,
    #[arg(long, default_value = "")]
    privacy_policy_website: String,
    #[arg(long, default_value = "")]
    license_agreement_website: String,
    #[arg(long)]
    animated: bool,
}

#[derive(Debug, Args)]
struct PackUpdateArgs {
    #[arg(long)]
    identifier: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    publisher_email: Option<String>,
    #[arg(long)]
    publisher_website: Option<String>,
    #[arg(long)]
    privacy_policy_website: Option<String>,
    #[arg(long)]
    license_agreement_website: Option<String>,
    #[arg(long)]
    animated: Option<bool>,
}

#[derive(Debug, Args)]
struct PackSetTrayArgs {
    #[arg(long)]
    identifier: String,
    #[arg(long)]
    file: String,
}

#[derive(Debug, Subcommand)]
enum StickerCommand {
    /// Register a file that is already in the asset directory.
    Add(StickerAddArgs),
    /// Copy an external image into the asset directory, then register it. An
    /// asset already stored under the same name is only reused when its bytes match.
    Import(StickerImportArgs),
    Delete(StickerDeleteArgs),
}

#[derive(Debug, Args)]
struct StickerAddArgs {
    #[arg(long)]
    identifier: String,
    #[arg(long)]
    file: String,
    #[arg(long = "emoji", required = true)]
    emojis: Vec<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
}

#[derive(Debug, Args)]
struct StickerImportArgs {
    #[arg(long)]
    identifier: String,
    #[arg(long)]
    source: PathBuf,
    /// Name inside the asset directory; defaults to the source file name.
    #[arg(long)]
    name: Option<String>,
    #[arg(long = "emoji", required = true)]
    emojis: Vec<String>,
}

#[derive(Debug, Args)]
struct StickerDeleteArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Subcommand)]
enum BackupCommand {
    Export(BackupExportArgs),
    Inspect(ArchiveArgs),
    Plan(ArchiveArgs),
    Restore(BackupRestoreArgs),
}

#[derive(Debug, Args)]
struct BackupExportArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Args)]
struct ArchiveArgs {
    #[arg(long)]
    archive: PathBuf,
}

#[derive(Debug, Args)]
struct BackupRestoreArgs {
    #[arg(long)]
    archive: PathBuf,
    #[arg(long = "identifier")]
    identifiers: Vec<String>,
    #[arg(long, conflicts_with = "identifiers")]
    all_new: bool,
}

#[derive(Debug, Subcommand)]
enum FilesCommand {
    Cleanup(FilesCleanupArgs),
}

#[derive(Debug, Args)]
struct FilesCleanupArgs {
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum ProviderCommand {
    Query(UriArgs),
    Type(UriArgs),
    Open(UriArgs),
}

#[derive(Debug, Args)]
struct UriArgs {
    #[arg(long)]
    uri: String,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    emit_json(serde_json::to_value(value)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = PacksmithApi::new(PacksmithConfig::resolve(cli.db, cli.files_dir));
    match cli.command {
        Command::Db { command } => run_db(command, &api),
        Command::Pack { command } => run_pack(command, &api),
        Command::Sticker { command } => run_sticker(command, &api),
        Command::Backup { command } => run_backup(command, &api),
        Command::Files { command } => run_files(&command, &api),
        Command::Provider { command } => run_provider(command, &api),
    }
}

fn run_db(command: DbCommand, api: &PacksmithApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => emit(&api.schema_status()?),
        DbCommand::Migrate(args) => emit(&api.migrate(args.dry_run)?),
        DbCommand::IntegrityCheck => {
            let report = api.integrity_check()?;
            let healthy = report.quick_check_ok && report.foreign_key_violations.is_empty();
            emit(&report)?;
            if healthy {
                Ok(())
            } else {
                Err(anyhow!("integrity check failed"))
            }
        }
    }
}

fn run_pack(command: PackCommand, api: &PacksmithApi) -> Result<()> {
    match command {
        PackCommand::Create(args) => emit(&api.create_package(CreatePackageRequest {
            name: args.name,
            author: args.author,
            publisher_email: args.publisher_email,
            publisher_website: args.publisher_website,
            privacy_policy_website: args.privacy_policy_website,
            license_agreement_website: args.license_agreement_website,
            animated: args.animated,
        })?),
        PackCommand::List => {
            let packages = api.list_packages()?;
            emit_json(serde_json::json!({ "packages": packages }))
        }
        PackCommand::Show(args) => {
            let package = api
                .get_package(&args.identifier)?
                .ok_or_else(|| anyhow!("package not found: {}", args.identifier))?;
            emit(&package)
        }
        PackCommand::Update(args) => emit(&api.update_package_metadata(
            &args.identifier,
            UpdateMetadataRequest {
                name: args.name,
                author: args.author,
                publisher_email: args.publisher_email,
                publisher_website: args.publisher_website,
                privacy_policy_website: args.privacy_policy_website,
                license_agreement_website: args.license_agreement_website,
                animated: args.animated,
            },
        )?),
        PackCommand::SetTray(args) => emit(&api.set_tray_image(&args.identifier, &args.file)?),
        PackCommand::Delete(args) => {
            let deleted = api.delete_package(&args.identifier)?;
            emit_json(serde_json::json!({ "identifier": args.identifier, "deleted": deleted }))
        }
    }
}

fn run_sticker(command: StickerCommand, api: &PacksmithApi) -> Result<()> {
    match command {
        StickerCommand::Add(args) => emit(&api.add_sticker(AddStickerRequest {
            identifier: args.identifier,
            image_file: args.file,
            emojis: args.emojis,
            width: args.width,
            height: args.height,
        })?),
        StickerCommand::Import(args) => {
            let name = match args.name {
                Some(name) => name,
                None => args
                    .source
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("source has no UTF-8 file name: {}", args.source.display()))?,
            };
            if api.assets().exists(&name) {
                let incoming = try_hash_file(&args.source)
                    .with_context(|| format!("failed to read {}", args.source.display()))?;
                if api.assets().hash(&name) != incoming {
                    return Err(anyhow!(
                        "asset {name} already exists with different content; pass --name to store it under another name"
                    ));
                }
            } else {
                let mut source = File::open(&args.source)
                    .with_context(|| format!("failed to open {}", args.source.display()))?;
                api.assets().write_atomic(&name, &mut source)?;
            }
            emit(&api.add_sticker(AddStickerRequest {
                identifier: args.identifier,
                image_file: name,
                emojis: args.emojis,
                width: None,
                height: None,
            })?)
        }
        StickerCommand::Delete(args) => {
            let deleted = api.delete_sticker(args.id)?;
            emit_json(serde_json::json!({ "sticker_id": args.id, "deleted": deleted }))
        }
    }
}

fn run_backup(command: BackupCommand, api: &PacksmithApi) -> Result<()> {
    match command {
        BackupCommand::Export(args) => emit(&api.export_backup(&args.out)?),
        BackupCommand::Inspect(args) => emit(&api.inspect_backup(&args.archive)?),
        BackupCommand::Plan(args) => emit(&api.plan_restore(&args.archive)?),
        BackupCommand::Restore(args) => {
            let mut plan = api.plan_restore(&args.archive)?;
            let mut not_selectable = Vec::new();
            if args.all_new {
                plan.select_all_new();
            } else {
                for identifier in &args.identifiers {
                    if !plan.is_selected(identifier) && !plan.toggle(identifier) {
                        not_selectable.push(identifier.clone());
                    }
                }
            }
            let selected: BTreeSet<String> = plan.selected().clone();
            tracing::info!(selected = selected.len(), "restoring packages from backup");
            let summary = api.restore_backup(&args.archive, &selected)?;
            emit_json(serde_json::json!({
                "selected": selected,
                "not_selectable": not_selectable,
                "summary": summary,
            }))
        }
    }
}

fn run_files(command: &FilesCommand, api: &PacksmithApi) -> Result<()> {
    match command {
        FilesCommand::Cleanup(args) => emit(&api.cleanup_orphan_files(args.dry_run)?),
    }
}

fn run_provider(command: ProviderCommand, api: &PacksmithApi) -> Result<()> {
    let provider = api.query_service()?;
    match command {
        ProviderCommand::Query(args) => emit(&provider.query(&args.uri)),
        ProviderCommand::Type(args) => {
            emit_json(serde_json::json!({ "uri": args.uri, "type": provider.get_type(&args.uri) }))
        }
        ProviderCommand::Open(args) => match provider.open_asset(&args.uri)? {
            Some(mut handle) => {
                let mut bytes = Vec::new();
                handle.file.read_to_end(&mut bytes)?;
                emit_json(serde_json::json!({
                    "file_name": handle.file_name,
                    "mime_type": handle.mime_type,
                    "bytes": bytes.len(),
                }))
            }
            None => Err(anyhow!("asset not found: {}", args.uri)),
        },
    }
}
