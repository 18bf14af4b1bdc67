use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use stratus::{
    Listing, OperationError, ResourceFacade,
    config::{DiskFormat, StratusConfig},
    logger,
    resource::{ContainerRecord, ImageRecord, VmRecord},
    vm::VmRequest,
};

#[derive(Parser)]
#[command(name = "stratus")]
#[command(about = "Drive QEMU, virsh and Docker from one place")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print listings as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Virtual machine operations
    Vm {
        #[command(subcommand)]
        vm_command: VmCommands,
    },
    /// Virtual disk operations
    Disk {
        #[command(subcommand)]
        disk_command: DiskCommands,
    },
    /// Container image operations
    Image {
        #[command(subcommand)]
        image_command: ImageCommands,
    },
    /// Container operations
    Container {
        #[command(subcommand)]
        container_command: ContainerCommands,
    },
    /// Check that every external tool is installed
    Doctor,
}

#[derive(Subcommand)]
enum VmCommands {
    /// Launch a VM from an existing disk image
    Create {
        /// Number of virtual CPUs
        #[arg(long, default_value = "1")]
        cpus: String,
        /// Memory in MB
        #[arg(long, default_value = "1024")]
        memory: String,
        /// Disk image (.qcow2 is qcow2, anything else raw)
        #[arg(long)]
        disk: String,
        /// Guest name
        #[arg(long)]
        name: Option<String>,
    },
    /// List domains known to virsh, in every state
    #[command(alias = "ls")]
    List,
    /// List running QEMU processes on this host
    Ps,
}

#[derive(Subcommand)]
enum DiskCommands {
    /// Create a new disk image
    Create {
        /// Target file
        path: PathBuf,
        /// Size such as 20G or 512M (bare numbers are GiB)
        size: String,
        /// Image format; must match the extension, which is added when missing
        #[arg(value_enum, long)]
        format: Option<DiskFormatArg>,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum DiskFormatArg {
    Qcow2,
    Raw,
}

impl From<DiskFormatArg> for DiskFormat {
    fn from(value: DiskFormatArg) -> Self {
        match value {
            DiskFormatArg::Qcow2 => DiskFormat::Qcow2,
            DiskFormatArg::Raw => DiskFormat::Raw,
        }
    }
}

#[derive(Subcommand)]
enum ImageCommands {
    /// List local images
    #[command(alias = "ls")]
    List,
    /// Build an image from a Dockerfile
    Build {
        /// Path to the Dockerfile; its directory is the build context
        dockerfile: PathBuf,
        /// Image name and tag, e.g. myapp:latest
        #[arg(short = 't', long = "tag")]
        name: String,
    },
    /// Pull an image from its registry
    Pull {
        /// Image name and tag
        name: String,
    },
    /// Look for an image in the local store
    Search {
        /// Image name and optional tag
        name: String,
    },
}

#[derive(Subcommand)]
enum ContainerCommands {
    /// List containers, stopped ones included
    #[command(alias = "ls")]
    List,
    /// Stop a container by id, id prefix or name
    Stop {
        /// Container id or name
        id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        logger::init_logger_with("stratus=debug");
    } else {
        logger::init_logger();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<OperationError>() {
                Some(op) => eprintln!("Error: {}", op.user_message()),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<StratusConfig> {
    let Some(path) = path.or_else(StratusConfig::default_path) else {
        return Ok(StratusConfig::default());
    };

    if path.exists() {
        StratusConfig::from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    } else {
        logger::warn!(
            "Configuration not found at {}, using defaults",
            path.display()
        );
        Ok(StratusConfig::default())
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config)?;
    let facade = ResourceFacade::system(config);
    let json = cli.json;

    match cli.command {
        Commands::Vm { vm_command } => match vm_command {
            VmCommands::Create {
                cpus,
                memory,
                disk,
                name,
            } => {
                let mut request = VmRequest::from_form(&cpus, &memory, &disk)?;
                if let Some(name) = name {
                    request = request.with_name(name);
                }
                let handle = facade.vms.create_vm(&request).await?;
                match handle.pid {
                    Some(pid) => println!("Virtual machine launched (pid {})", pid),
                    None => println!("Virtual machine launched"),
                }
            }
            VmCommands::List => print_vms(&facade.vms.list_vms().await?, json)?,
            VmCommands::Ps => print_vms(&facade.vms.list_running_vms().await?, json)?,
        },
        Commands::Disk { disk_command } => match disk_command {
            DiskCommands::Create { path, size, format } => {
                let disk = facade
                    .disks
                    .create_disk(&path, &size, format.map(Into::into))
                    .await?;
                println!(
                    "Disk created at {} ({})",
                    disk.path.display(),
                    disk.format.as_str()
                );
            }
        },
        Commands::Image { image_command } => match image_command {
            ImageCommands::List => print_images(&facade.images.list_images().await?, json)?,
            ImageCommands::Build { dockerfile, name } => {
                let output = facade.images.build_image(&dockerfile, &name).await?;
                print!("{}", output.stdout);
                println!("Image '{}' built successfully", name);
            }
            ImageCommands::Pull { name } => {
                facade.images.pull_image(&name).await?;
                println!("Image '{}' pulled successfully", name);
            }
            ImageCommands::Search { name } => {
                let found = facade.images.search_local_image(&name).await?;
                if found.is_empty() && !json {
                    println!("No matching image found locally");
                } else {
                    print_images(&found, json)?;
                }
            }
        },
        Commands::Container { container_command } => match container_command {
            ContainerCommands::List => {
                print_containers(&facade.containers.list_containers().await?, json)?
            }
            ContainerCommands::Stop { id } => {
                let stopped = facade.containers.stop_listed_container(&id).await?;
                println!("Container {} ({}) stopped", stopped.name, stopped.id);
            }
        },
        Commands::Doctor => {
            let summary = facade.preflight().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary);
            }
            if !summary.is_ready() {
                anyhow::bail!("{} tool(s) unavailable", summary.issues.len());
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(listing: &Listing<T>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(listing)?);
    Ok(())
}

fn report_skipped<T>(listing: &Listing<T>) {
    for row in &listing.skipped {
        eprintln!("warning: line {} skipped ({}): {}", row.line_no, row.reason, row.raw.trim());
    }
}

fn print_vms(listing: &Listing<VmRecord>, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(listing);
    }

    println!("{:<8} {:<40} {:<10}", "ID", "NAME", "STATE");
    println!("{}", "=".repeat(60));
    for vm in listing {
        println!(
            "{:<8} {:<40} {:<10}",
            vm.id.as_deref().unwrap_or("-"),
            vm.name,
            vm.state
        );
    }
    if listing.is_empty() {
        println!("No virtual machines found");
    }
    report_skipped(listing);
    Ok(())
}

fn print_images(listing: &Listing<ImageRecord>, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(listing);
    }

    println!("{:<40} {:<20} {:<14}", "REPOSITORY", "TAG", "IMAGE ID");
    println!("{}", "=".repeat(76));
    for image in listing {
        println!("{:<40} {:<20} {:<14}", image.repository, image.tag, image.id);
    }
    if listing.is_empty() {
        println!("No images found");
    }
    report_skipped(listing);
    Ok(())
}

fn print_containers(listing: &Listing<ContainerRecord>, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(listing);
    }

    println!(
        "{:<14} {:<30} {:<28} {:<20}",
        "CONTAINER ID", "IMAGE", "STATUS", "NAME"
    );
    println!("{}", "=".repeat(95));
    for container in listing {
        println!(
            "{:<14} {:<30} {:<28} {:<20}",
            container.id, container.image, container.status, container.name
        );
    }
    if listing.is_empty() {
        println!("No containers found");
    }
    report_skipped(listing);
    Ok(())
}
