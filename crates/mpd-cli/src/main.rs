//! MPD CLI - Multi-package development on top of Spack, CMake and git

use anyhow::Result;
use clap::{Parser, Subcommand};
use mpd_core::orchestrate::ZapTarget;
use mpd_core::Orchestrator;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod build;
mod clone;
mod concretize;
mod context;
mod display;
mod init;
mod list;
mod new_project;
mod prompt;
mod refresh;
mod rm_project;
mod select;

/// Environment variable holding a log filter; takes precedence over `--log-level`.
const LOG_ENV: &str = "MPD_LOG";

#[derive(Parser)]
#[command(name = "mpd")]
#[command(version = mpd_core::VERSION)]
#[command(about = "Develop several packages together", long_about = None)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize MPD on this system
    Init,

    /// Create an MPD development area
    #[command(name = "new-project", visible_alias = "n")]
    NewProject {
        /// Project name (required if --top is not specified)
        #[arg(long)]
        name: Option<String>,

        /// Top-level directory for the development area (default: current directory)
        #[arg(short = 'T', long)]
        top: Option<PathBuf>,

        /// Directory containing repositories to develop (default: <top>/srcs)
        #[arg(short = 'S', long)]
        srcs: Option<PathBuf>,

        /// Overwrite an existing project with the same name
        #[arg(short, long)]
        force: bool,

        /// Environment from which to create the project (multiple allowed)
        #[arg(short = 'E', long = "env")]
        envs: Vec<String>,

        /// Constraint on a package that is not developed (multiple allowed)
        #[arg(short = 'D', long = "dependency")]
        dependencies: Vec<String>,

        /// Answer yes/default to all prompts
        #[arg(short, long = "yes-to-all")]
        yes: bool,

        /// Variants to apply to developed packages
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        variants: Vec<String>,
    },

    /// Refresh the selected project after sources or variants changed
    Refresh {
        /// Refresh even if the project is up-to-date
        #[arg(short, long)]
        force: bool,

        /// Constraint on a package that is not developed (multiple allowed)
        #[arg(short = 'D', long = "dependency")]
        dependencies: Vec<String>,

        /// Answer yes/default to all prompts
        #[arg(short, long = "yes-to-all")]
        yes: bool,

        /// Variants to apply to developed packages
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        variants: Vec<String>,
    },

    /// Clone git repositories for development
    #[command(name = "git-clone", visible_aliases = ["g", "clone"])]
    Clone {
        /// Known repository name or URL of a git repository
        repos: Vec<String>,

        /// Clone the repositories of the given suites
        #[arg(long, num_args = 1..)]
        suites: Vec<String>,

        /// List supported repositories
        #[arg(long, conflicts_with = "help_suites")]
        help_repos: bool,

        /// List supported suites
        #[arg(long)]
        help_suites: bool,
    },

    /// Select an MPD project
    Select {
        /// Top-level directory of the project
        directory: Option<PathBuf>,

        /// Name of the project
        #[arg(short, long, conflicts_with = "directory")]
        project: Option<String>,
    },

    /// Clear the selected MPD project
    Clear {
        /// Clear the selection of every shell
        #[arg(long)]
        all: bool,
    },

    /// List MPD projects
    #[command(visible_alias = "ls")]
    List {
        /// Print details of the named projects
        projects: Vec<String>,

        /// Print the top-level directory of a project
        #[arg(short, long, value_name = "PROJECT", conflicts_with = "projects")]
        top: Option<String>,
    },

    /// Show the MPD status of this shell
    Status,

    /// Configure and build the developed packages
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Build and install the developed packages
    #[command(visible_alias = "i")]
    Install {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Build and run tests
    #[command(visible_alias = "t")]
    Test {
        #[command(flatten)]
        build: BuildArgs,
    },

    /// Delete everything in the build and/or install areas (--build if nothing given)
    #[command(visible_alias = "z")]
    Zap {
        /// Delete the build and install areas
        #[arg(long, conflicts_with_all = ["build", "install"])]
        all: bool,

        /// Delete the build area
        #[arg(long, conflicts_with = "install")]
        build: bool,

        /// Uninstall the developed packages
        #[arg(long)]
        install: bool,
    },

    /// Remove an MPD project
    #[command(name = "rm-project", visible_alias = "rm")]
    RmProject {
        /// Project to remove
        project: String,

        /// Also remove the whole top-level directory, sources included
        #[arg(long)]
        full: bool,
    },
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Number of parallel jobs
    #[arg(short = 'j', long = "parallel")]
    jobs: Option<usize>,

    /// Arguments passed to the generator (after `--`)
    #[arg(last = true)]
    generator_args: Vec<String>,
}

impl BuildArgs {
    fn options(self) -> mpd_core::orchestrate::BuildOptions {
        mpd_core::orchestrate::BuildOptions {
            parallelism: self.jobs,
            generator_args: self.generator_args,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Exit code for the first library error in the chain; 1 for anything else.
fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<mpd_core::Error>())
        .map_or(1, |e| e.kind().exit_code())
}

fn run(command: Commands) -> Result<()> {
    let (home, settings) = context::load()?;
    debug!(root = %home.root().display(), "loaded settings");
    let host = context::HostTools::new(&settings);
    let mpd = Orchestrator::new(home, settings, host.tools());
    dispatch(&mpd, command)
}

fn dispatch(mpd: &Orchestrator<'_>, command: Commands) -> Result<()> {
    match command {
        Commands::Init => init::init(mpd),

        Commands::NewProject {
            name,
            top,
            srcs,
            force,
            envs,
            dependencies,
            yes,
            variants,
        } => {
            let options = new_project::NewProjectOptions {
                name,
                top,
                srcs,
                force,
                envs,
                dependencies,
                yes,
                variants,
            };
            new_project::new_project(mpd, options)
        }

        Commands::Refresh {
            force,
            dependencies,
            yes,
            variants,
        } => {
            let options = refresh::RefreshOptions {
                force,
                dependencies,
                yes,
                variants,
            };
            refresh::refresh(mpd, &options)
        }

        Commands::Clone {
            repos,
            suites,
            help_repos,
            help_suites,
        } => {
            let options = clone::CloneOptions {
                repos,
                suites,
                help_repos,
                help_suites,
            };
            clone::clone(mpd, &options)
        }

        Commands::Select { directory, project } => select::select(mpd, directory, project),

        Commands::Clear { all } => select::clear(mpd, all),

        Commands::List { projects, top } => list::list(mpd, &projects, top.as_deref()),

        Commands::Status => list::status(mpd),

        Commands::Build { build } => build::build(mpd, &build.options()),

        Commands::Install { build } => build::install(mpd, &build.options()),

        Commands::Test { build } => build::test(mpd, &build.options()),

        Commands::Zap {
            all,
            build: _,
            install,
        } => {
            let target = if all {
                ZapTarget::All
            } else if install {
                ZapTarget::Install
            } else {
                ZapTarget::Build // Default
            };
            build::zap(mpd, target)
        }

        Commands::RmProject { project, full } => rm_project::rm_project(mpd, &project, full),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_aliases_parse() {
        for alias in ["n", "new-project"] {
            let cli = Cli::try_parse_from(["mpd", alias, "--name", "demo", "+debug", "cxxstd=20"]).unwrap();
            let Commands::NewProject { name, variants, .. } = cli.command else {
                panic!("expected new-project");
            };
            assert_eq!(name.as_deref(), Some("demo"));
            assert_eq!(variants, vec!["+debug", "cxxstd=20"]);
        }
        assert!(matches!(
            Cli::try_parse_from(["mpd", "g", "art"]).unwrap().command,
            Commands::Clone { .. }
        ));
        assert!(matches!(
            Cli::try_parse_from(["mpd", "rm", "demo"]).unwrap().command,
            Commands::RmProject { .. }
        ));
    }

    #[test]
    fn test_build_generator_args() {
        let cli = Cli::try_parse_from(["mpd", "b", "-j", "8", "--", "-k", "VERBOSE=1"]).unwrap();
        let Commands::Build { build } = cli.command else {
            panic!("expected build");
        };
        let options = build.options();
        assert_eq!(options.parallelism, Some(8));
        assert_eq!(options.generator_args, vec!["-k", "VERBOSE=1"]);
    }

    #[test]
    fn test_zap_flags_conflict() {
        assert!(Cli::try_parse_from(["mpd", "zap", "--all", "--install"]).is_err());
        assert!(Cli::try_parse_from(["mpd", "z", "--install"]).is_ok());
    }

    #[test]
    fn test_exit_code_follows_error_kind() {
        let err = anyhow::Error::from(mpd_core::Error::ProjectNotFound("demo".to_string()));
        assert_eq!(exit_code(&err), 1);
        let err = anyhow::Error::from(mpd_core::Error::EnvironmentActive("demo".to_string()))
            .context("removing project");
        assert_eq!(exit_code(&err), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
