//! siftool - SIF container inspection and editing
//!
//! Displays headers and object descriptors, dumps payloads, and adds or
//! removes objects in SIF container images.

mod fmt;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sif_core::Arch;
use sif_format::{
    CryptoMessageMetadata, Datatype, FormatType, FsType, HashType, MessageType, PartType,
    PartitionMetadata, SignatureMetadata,
};
use sif_image::select::with_id;
use sif_image::{CreateOptions, DeleteOptions, DescriptorInput, FileImage, DEFAULT_CAPACITY};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "siftool")]
#[command(about = "Inspect and modify SIF container images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter, falls back to RUST_LOG
    #[arg(long, global = true, env = "SIFTOOL_LOG")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Display the global header
    Header {
        /// Container file
        file: PathBuf,
    },

    /// List object descriptors
    List {
        /// Container file
        file: PathBuf,

        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display detailed information of one object descriptor
    Info {
        /// Object ID
        id: u32,
        /// Container file
        file: PathBuf,
    },

    /// Write an object's payload to stdout
    Dump {
        /// Object ID
        id: u32,
        /// Container file
        file: PathBuf,
    },

    /// Create an empty container
    New {
        /// Container file to create
        file: PathBuf,

        /// Descriptor table capacity
        #[arg(long, default_value_t = DEFAULT_CAPACITY)]
        capacity: usize,

        /// Architecture recorded in the header
        #[arg(long, default_value = "unknown")]
        arch: Arch,

        /// Container UUID (random if omitted)
        #[arg(long)]
        uuid: Option<Uuid>,
    },

    /// Add an object
    Add(AddArgs),

    /// Delete an object
    Del {
        /// Object ID
        id: u32,
        /// Container file
        file: PathBuf,

        /// Overwrite the payload with zeros
        #[arg(long)]
        zero: bool,
    },

    /// Make a partition the primary system partition
    Setprim {
        /// Object ID of the partition
        id: u32,
        /// Container file
        file: PathBuf,
    },
}

#[derive(Args)]
struct AddArgs {
    /// Container file
    file: PathBuf,

    /// File holding the object payload
    payload: PathBuf,

    /// Object datatype (deffile, envvar, labels, partition, signature, json, generic, cryptomessage)
    #[arg(long)]
    datatype: Datatype,

    /// Object name (defaults to the payload file name)
    #[arg(long)]
    name: Option<String>,

    /// Group to place the object in
    #[arg(long)]
    group: Option<u32>,

    /// Link to another object by ID
    #[arg(long, conflicts_with = "link_group")]
    link_id: Option<u32>,

    /// Link to a group
    #[arg(long)]
    link_group: Option<u32>,

    /// Partition filesystem type (squashfs, ext3, immuobj, raw, encryptedsquashfs)
    #[arg(long)]
    fstype: Option<FsType>,

    /// Partition type (system, primsys, data, overlay)
    #[arg(long)]
    parttype: Option<PartType>,

    /// Partition architecture
    #[arg(long)]
    partarch: Option<Arch>,

    /// Signature hash type (sha256, sha384, sha512, blake2s, blake2b)
    #[arg(long)]
    hashtype: Option<HashType>,

    /// Signing entity, hex-encoded
    #[arg(long)]
    entity: Option<String>,

    /// Cryptographic message format (openpgp, pem)
    #[arg(long)]
    formattype: Option<FormatType>,

    /// Cryptographic message type (clearsignature, rsaoaep)
    #[arg(long)]
    messagetype: Option<MessageType>,

    /// Payload alignment in bytes
    #[arg(long, default_value_t = 1)]
    alignment: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = cli
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    tracing::debug!("siftool v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Header { file } => cmd_header(&file),
        Command::List { file, json } => cmd_list(&file, json),
        Command::Info { id, file } => cmd_info(id, &file),
        Command::Dump { id, file } => cmd_dump(id, &file),
        Command::New {
            file,
            capacity,
            arch,
            uuid,
        } => cmd_new(&file, capacity, arch, uuid),
        Command::Add(args) => cmd_add(&args),
        Command::Del { id, file, zero } => cmd_del(id, &file, zero),
        Command::Setprim { id, file } => cmd_setprim(id, &file),
    }
}

fn load(path: &Path, writable: bool) -> Result<FileImage> {
    FileImage::load(path, writable)
        .with_context(|| format!("while loading container {}", path.display()))
}

fn unload(image: FileImage) -> Result<()> {
    image.unload().context("while unloading container")
}

fn cmd_header(path: &Path) -> Result<()> {
    let image = load(path, false)?;
    print!("{}", fmt::HeaderView(image.header()));
    unload(image)
}

fn cmd_list(path: &Path, json: bool) -> Result<()> {
    let image = load(path, false)?;

    if json {
        let views = image
            .descriptors()
            .map(fmt::ObjectView::new)
            .collect::<sif_core::Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        println!("Container id: {}", image.id());
        println!("Created on:   {}", fmt::timestamp(image.created()));
        println!("Modified on:  {}", fmt::timestamp(image.modified()));
        println!(
            "Descriptors:  {} used, {} free",
            image.descriptors_total() - image.descriptors_free(),
            image.descriptors_free()
        );
        println!();
        print!("{}", fmt::DescriptorList(image.descriptors().collect()));
    }

    unload(image)
}

fn cmd_info(id: u32, path: &Path) -> Result<()> {
    let image = load(path, false)?;
    let descr = image.get_descriptor([with_id(id)])?;
    println!("Descriptor info:");
    print!("{}", fmt::DescriptorInfo(descr));
    unload(image)
}

fn cmd_dump(id: u32, path: &Path) -> Result<()> {
    let mut image = load(path, false)?;
    {
        let mut reader = image.object_reader(id)?;
        let stdout = io::stdout();
        let mut out = stdout.lock();
        io::copy(&mut reader, &mut out).context("while writing payload")?;
        out.flush()?;
    }
    unload(image)
}

fn cmd_new(path: &Path, capacity: usize, arch: Arch, id: Option<Uuid>) -> Result<()> {
    let options = CreateOptions {
        capacity,
        arch,
        id,
        ..Default::default()
    };
    let image = FileImage::create(path, options)
        .with_context(|| format!("while creating container {}", path.display()))?;
    println!("Created container {} ({})", path.display(), image.id());
    unload(image)
}

fn cmd_add(args: &AddArgs) -> Result<()> {
    let input = descriptor_input(args)?;
    let payload = std::fs::read(&args.payload)
        .with_context(|| format!("while reading payload {}", args.payload.display()))?;

    let mut image = load(&args.file, true)?;
    let id = image.add_object(input, &payload)?;
    println!("Added object {} ({} bytes)", id, payload.len());
    unload(image)
}

fn cmd_del(id: u32, path: &Path, zero: bool) -> Result<()> {
    let mut image = load(path, true)?;
    image.delete_object(id, DeleteOptions { zero })?;
    println!("Deleted object {}", id);
    unload(image)
}

fn cmd_setprim(id: u32, path: &Path) -> Result<()> {
    let mut image = load(path, true)?;
    image.set_primary_partition(id)?;
    println!("Object {} is now the primary partition ({})", id, image.arch());
    unload(image)
}

/// Build the add request from flags, requiring the metadata its datatype needs
fn descriptor_input(args: &AddArgs) -> Result<DescriptorInput> {
    let name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .payload
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let mut input = DescriptorInput::new(args.datatype)
        .with_name(name)
        .with_alignment(args.alignment);
    if let Some(group) = args.group {
        input = input.with_group(group);
    }
    if let Some(id) = args.link_id {
        input = input.with_linked_id(id)?;
    } else if let Some(group) = args.link_group {
        input = input.with_linked_group_id(group)?;
    }

    let input = match args.datatype {
        Datatype::Partition => {
            let meta = PartitionMetadata::new(
                args.fstype.context("--fstype is required for partitions")?,
                args.parttype.context("--parttype is required for partitions")?,
                args.partarch.context("--partarch is required for partitions")?,
            );
            input.with_metadata(&meta)
        }
        Datatype::Signature => {
            let hash_type = args
                .hashtype
                .context("--hashtype is required for signatures")?;
            let entity = match &args.entity {
                Some(entity) => hex::decode(entity).context("--entity must be hex-encoded")?,
                None => Vec::new(),
            };
            input.with_metadata(&SignatureMetadata::new(hash_type, &entity)?)
        }
        Datatype::CryptoMessage => {
            let meta = CryptoMessageMetadata {
                format_type: args
                    .formattype
                    .context("--formattype is required for cryptographic messages")?,
                message_type: args
                    .messagetype
                    .context("--messagetype is required for cryptographic messages")?,
            };
            input.with_metadata(&meta)
        }
        _ => input,
    };

    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sif_format::Link;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    fn add_args(extra: &[&str]) -> AddArgs {
        let mut argv = vec!["siftool", "add", "test.sif", "/tmp/rootfs.squashfs"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Add(args) => args,
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_partition_input() {
        let args = add_args(&[
            "--datatype",
            "partition",
            "--fstype",
            "squashfs",
            "--parttype",
            "primsys",
            "--partarch",
            "amd64",
            "--group",
            "1",
        ]);
        let input = descriptor_input(&args).unwrap();
        assert_eq!(input.name, "rootfs.squashfs");
        assert_eq!(input.group, Some(1));
        assert_eq!(input.datatype, Datatype::Partition);
    }

    #[test]
    fn test_partition_needs_metadata() {
        let args = add_args(&["--datatype", "partition"]);
        assert!(descriptor_input(&args).is_err());
    }

    #[test]
    fn test_signature_input() {
        let args = add_args(&[
            "--datatype",
            "signature",
            "--hashtype",
            "sha256",
            "--entity",
            "0a0b",
            "--link-id",
            "1",
            "--name",
            "sig",
        ]);
        let input = descriptor_input(&args).unwrap();
        assert_eq!(input.name, "sig");
        assert_eq!(input.link, Link::Object(1));
    }

    #[test]
    fn test_link_flags_conflict() {
        let argv = [
            "siftool", "add", "f.sif", "p", "--datatype", "generic", "--link-id", "1",
            "--link-group", "1",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
