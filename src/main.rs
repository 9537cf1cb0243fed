//! scalelab CLI - GKE Autopilot autoscaling lab runbook

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use scalelab::commands::Context;
use scalelab::commands::experiment::ExperimentOverrides;
use scalelab::config::Settings;
use scalelab::utils::errors::{display_error_and_exit, enhance_error};
use scalelab::utils::{
    CommonPrereqs, ContainerRuntime, Prerequisite, ScaleLabError, SystemRunner, dryrun, logger,
};
use scalelab::{log_error, log_info};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scalelab")]
#[command(author, version, about = "Runbook CLI for GKE Autopilot autoscaling experiments", long_about = None)]
struct Cli {
    /// Verbose output (can be used multiple times: -v, -vv, -vvv)
    /// -v: INFO, -vv: DEBUG, -vvv: TRACE
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Dry-run mode: show what would be done without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Settings file (default: .scalelab.toml, then ~/.config/scalelab/config.toml)
    #[arg(short, long, global = true, env = "SCALELAB_CONFIG")]
    config: Option<PathBuf>,

    /// Path to kubeconfig file
    #[arg(long, global = true, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the GKE Autopilot cluster
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },

    /// Manage the monitoring VM
    Vm {
        #[command(subcommand)]
        command: VmCommands,
    },

    /// Manage the firewall rule that exposes Prometheus
    Firewall {
        #[command(subcommand)]
        command: FirewallCommands,
    },

    /// Install and run the metrics collection stack
    Monitoring {
        #[command(subcommand)]
        command: MonitoringCommands,
    },

    /// Render and manage experiment workloads
    Workload {
        #[command(subcommand)]
        command: WorkloadCommands,
    },

    /// Run experiments and inspect their results
    Experiment {
        #[command(subcommand)]
        command: ExperimentCommands,
    },

    /// Manage the settings file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Check prerequisites
    Check,

    /// Generate shell completion scripts
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Create the Autopilot cluster (skipped if it exists) and fetch credentials
    Create,

    /// Fetch kubectl credentials for the cluster
    Credentials,

    /// Show cluster status
    Status,

    /// Delete the cluster
    Delete,
}

#[derive(Subcommand)]
enum VmCommands {
    /// Create the monitoring VM (skipped if it exists)
    Create,

    /// Start the VM
    Start,

    /// Stop the VM
    Stop,

    /// Show VM status and external IP
    Status,

    /// Delete the VM
    Delete,

    /// Install Docker on the VM over ssh unless already present
    InstallRuntime,
}

#[derive(Subcommand)]
enum FirewallCommands {
    /// Create the Prometheus ingress rule unless it exists
    Ensure,
}

#[derive(Subcommand)]
enum MonitoringCommands {
    /// Write the kube-state-metrics chart values file
    Values {
        /// Overwrite an existing values file
        #[arg(long)]
        force: bool,
    },

    /// Install or upgrade kube-state-metrics with helm
    Ksm,

    /// Uninstall the kube-state-metrics release
    KsmRemove,

    /// Wait for the kube-state-metrics external IP
    Discover,

    /// Generate prometheus.yml
    Config {
        /// kube-state-metrics IP; discovered from the cluster when omitted
        #[arg(long)]
        ip: Option<String>,
    },

    /// Start the exporter and Prometheus containers
    Up {
        /// kube-state-metrics IP to scrape (skips discovery)
        #[arg(long)]
        ip: Option<String>,
    },

    /// Stop and remove the containers
    Down,
}

#[derive(Subcommand)]
enum WorkloadCommands {
    /// Write <app>-{deployment,service,hpa,loadgen}.yaml into the manifests directory
    Render {
        /// Application name
        app: String,

        /// Kubernetes namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Apply the deployment, service and HPA
    Apply {
        /// Application name
        app: String,

        /// Kubernetes namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Also apply the in-cluster load generator
        #[arg(long)]
        with_loadgen: bool,

        /// Render in memory instead of reading the manifests directory
        #[arg(long)]
        inline: bool,
    },

    /// Scale the deployment and wait for the rollout
    Scale {
        /// Application name
        app: String,

        /// Target replica count
        replicas: u32,

        /// Kubernetes namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Delete the workload objects
    Delete {
        /// Application name
        app: String,

        /// Kubernetes namespace
        #[arg(short, long)]
        namespace: Option<String>,

        /// Also delete the in-cluster load generator
        #[arg(long)]
        with_loadgen: bool,
    },
}

/// Options shared by the experiment runners
#[derive(Args)]
struct RunArgs {
    /// Application name (manifests <app>-*.yaml, objects <app>-*)
    app: String,

    /// Experiment name (default: YYYYMMDD_HHMM_<app>)
    #[arg(long)]
    name: Option<String>,

    /// Kubernetes namespace
    #[arg(short, long)]
    namespace: Option<String>,

    /// Prometheus server URL
    #[arg(long)]
    prometheus_url: Option<String>,

    /// Sampling interval for the export (e.g. 15s, 1m)
    #[arg(long)]
    sampling_interval: Option<String>,

    /// Directory for the times file and CSV
    #[arg(long)]
    data_dir: Option<String>,
}

impl RunArgs {
    fn overrides(&self) -> ExperimentOverrides {
        ExperimentOverrides {
            name: self.name.clone(),
            prometheus_url: self.prometheus_url.clone(),
            sampling_interval: self.sampling_interval.clone(),
            data_dir: self.data_dir.clone(),
        }
    }
}

#[derive(Subcommand)]
enum ExperimentCommands {
    /// Step the deployment's replicas up and record how the cluster follows
    Scale {
        #[command(flatten)]
        run: RunArgs,

        /// Minutes to hold after each step
        #[arg(long, default_value_t = 1.0)]
        wait_minutes: f64,

        /// Highest replica count
        #[arg(long, default_value_t = 4)]
        max_replicas: u32,

        /// Replicas added per step
        #[arg(long, default_value_t = 1)]
        step_size: u32,
    },

    /// Load the service behind its HPA and record the autoscaler's response
    Hpa {
        #[command(flatten)]
        run: RunArgs,

        /// Concurrent virtual users
        #[arg(long, default_value_t = 10)]
        users: u32,

        /// Users started per second
        #[arg(long, default_value_t = 1.0)]
        spawn_rate: f64,

        /// Load duration (e.g. 300s, 20m, 1h30m)
        #[arg(long, default_value = "5m")]
        run_time: String,
    },

    /// Summarize an exported experiment
    Summarize {
        /// Experiment name
        name: String,

        /// Directory holding <name>_export.csv
        #[arg(long)]
        data_dir: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a starting settings file
    Init {
        /// Destination (default: .scalelab.toml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// GCP project id to fill in
        #[arg(long)]
        project: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective settings
    Show,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging based on verbosity level
    logger::init(cli.verbose);

    // Set dry-run mode
    if cli.dry_run {
        dryrun::set_dry_run(true);
        log_info!("DRY RUN MODE: No changes will be made");
        println!();
    }

    if let Err(e) = run(cli) {
        display_error_and_exit(enhance_error(e));
    }
}

fn run(cli: Cli) -> Result<()> {
    // Commands that do not need settings
    match &cli.command {
        Commands::Config {
            command:
                ConfigCommands::Init {
                    path,
                    project,
                    force,
                },
        } => {
            let written = scalelab::commands::config::init(path.clone(), project.clone(), *force)?;
            println!("Wrote {}", written.display());
            return Ok(());
        }
        Commands::Check => return handle_check_command(),
        Commands::Completion { shell } => return handle_completion_command(*shell),
        Commands::Version => return handle_version_command(),
        _ => {}
    }

    let settings = Settings::load(cli.config.as_deref())?;
    let runner = SystemRunner;
    let ctx = Context {
        settings,
        runner: &runner,
        kubeconfig: cli.kubeconfig,
        assume_yes: cli.yes,
    };

    match cli.command {
        Commands::Cluster { command } => handle_cluster_command(&ctx, command),
        Commands::Vm { command } => handle_vm_command(&ctx, command),
        Commands::Firewall { command } => handle_firewall_command(&ctx, command),
        Commands::Monitoring { command } => handle_monitoring_command(&ctx, command),
        Commands::Workload { command } => handle_workload_command(&ctx, command),
        Commands::Experiment { command } => handle_experiment_command(&ctx, command),
        Commands::Config { command } => handle_config_command(&ctx, command),
        Commands::Check | Commands::Completion { .. } | Commands::Version => Ok(()),
    }
}

fn handle_cluster_command(ctx: &Context, command: ClusterCommands) -> Result<()> {
    use scalelab::commands::cluster;

    match command {
        ClusterCommands::Create => cluster::create(ctx),
        ClusterCommands::Credentials => cluster::credentials(ctx),
        ClusterCommands::Status => cluster::status(ctx),
        ClusterCommands::Delete => cluster::delete(ctx),
    }
}

fn handle_vm_command(ctx: &Context, command: VmCommands) -> Result<()> {
    use scalelab::commands::vm;

    match command {
        VmCommands::Create => vm::create(ctx),
        VmCommands::Start => vm::start(ctx),
        VmCommands::Stop => vm::stop(ctx),
        VmCommands::Status => vm::status(ctx),
        VmCommands::Delete => vm::delete(ctx),
        VmCommands::InstallRuntime => vm::install_runtime(ctx),
    }
}

fn handle_firewall_command(ctx: &Context, command: FirewallCommands) -> Result<()> {
    match command {
        FirewallCommands::Ensure => scalelab::commands::vm::ensure_firewall(ctx),
    }
}

fn handle_monitoring_command(ctx: &Context, command: MonitoringCommands) -> Result<()> {
    use scalelab::commands::monitoring;

    match command {
        MonitoringCommands::Values { force } => monitoring::values(ctx, force),
        MonitoringCommands::Ksm => monitoring::install_ksm(ctx),
        MonitoringCommands::KsmRemove => monitoring::remove_ksm(ctx),
        MonitoringCommands::Discover => monitoring::discover(ctx),
        MonitoringCommands::Config { ip } => monitoring::config(ctx, ip),
        MonitoringCommands::Up { ip } => monitoring::up(ctx, ip, ContainerRuntime::detect()?),
        MonitoringCommands::Down => monitoring::down(ctx, ContainerRuntime::detect()?),
    }
}

fn handle_workload_command(ctx: &Context, command: WorkloadCommands) -> Result<()> {
    use scalelab::commands::workload;

    match command {
        WorkloadCommands::Render { app, namespace } => workload::render(ctx, &app, namespace),
        WorkloadCommands::Apply {
            app,
            namespace,
            with_loadgen,
            inline,
        } => workload::apply(ctx, &app, namespace, with_loadgen, inline),
        WorkloadCommands::Scale {
            app,
            replicas,
            namespace,
        } => workload::scale(ctx, &app, namespace, replicas),
        WorkloadCommands::Delete {
            app,
            namespace,
            with_loadgen,
        } => workload::delete(ctx, &app, namespace, with_loadgen),
    }
}

fn handle_experiment_command(ctx: &Context, command: ExperimentCommands) -> Result<()> {
    use scalelab::commands::experiment;

    match command {
        ExperimentCommands::Scale {
            run,
            wait_minutes,
            max_replicas,
            step_size,
        } => experiment::run_scale(
            ctx,
            &run.app,
            &run.overrides(),
            run.namespace.clone(),
            wait_minutes,
            max_replicas,
            step_size,
        ),
        ExperimentCommands::Hpa {
            run,
            users,
            spawn_rate,
            run_time,
        } => experiment::run_hpa(
            ctx,
            &run.app,
            &run.overrides(),
            run.namespace.clone(),
            users,
            spawn_rate,
            &run_time,
        ),
        ExperimentCommands::Summarize { name, data_dir } => {
            experiment::summarize(ctx, &name, data_dir)
        }
    }
}

fn handle_config_command(ctx: &Context, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => scalelab::commands::config::show(ctx),
        // Handled before settings are loaded
        ConfigCommands::Init { .. } => Ok(()),
    }
}

fn handle_check_command() -> Result<()> {
    log_info!("Checking prerequisites...");

    let gcloud = CommonPrereqs::gcloud();
    let kubectl = CommonPrereqs::kubectl();
    let helm = CommonPrereqs::helm();
    let auth_plugin = CommonPrereqs::gke_auth_plugin();
    let prereqs: Vec<&dyn Prerequisite> = vec![&gcloud, &kubectl, &helm, &auth_plugin];

    let (found, mut missing) = CommonPrereqs::check_all(&prereqs);
    for name in &found {
        println!("  ✓ {}", name);
    }

    match ContainerRuntime::detect() {
        Ok(runtime) => println!("  ✓ {} (container runtime)", runtime),
        Err(e) => {
            log_error!("{}", e);
            missing.push((
                "docker".to_string(),
                "Install Docker or Podman, or run the stack on the VM: scalelab vm install-runtime"
                    .to_string(),
            ));
        }
    }

    if !missing.is_empty() {
        for (name, hint) in &missing {
            ScaleLabError::tool_not_found(name, hint).display();
        }
        std::process::exit(1);
    }

    let runner = SystemRunner;
    match scalelab::gcp::gcloud::active_account(&runner)? {
        Some(account) => println!("  ✓ gcloud account: {}", account),
        None => display_error_and_exit(ScaleLabError::gcloud_not_authenticated()),
    }

    log_info!("All prerequisites satisfied!");
    Ok(())
}

fn handle_completion_command(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "scalelab", &mut io::stdout());
    Ok(())
}

fn handle_version_command() -> Result<()> {
    println!("scalelab {}", env!("CARGO_PKG_VERSION"));
    println!("Runbook CLI for GKE Autopilot autoscaling experiments");
    Ok(())
}
