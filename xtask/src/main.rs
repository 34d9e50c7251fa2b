use clap::{Parser, Subcommand};

use crate::{build::Arch, fuzz::Fuzz, test::Test};

mod build;
mod doc;
mod fuzz;
mod run;
mod vm;

/// Development tasks for the bootdisc-rs boot manager
#[derive(Parser)]
#[command(about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the boot manager and its integration tests as UEFI images
    Build {
        /// Use the release-lto profile
        #[arg(short, long, default_value_t = false)]
        release: bool,

        /// Firmware architecture to build for
        #[arg(short, long, value_enum, default_value_t = Arch::X64)]
        arch: Arch,

        /// Extra features for bootdisc-rs-core, separated by spaces
        #[arg(short, long)]
        features: Option<Vec<String>>,

        /// Leave out the default features, keeping only the allocator and panic handler
        #[arg(long, default_value_t = false)]
        no_default_features: bool,
    },

    /// Generate the API docs of bootdisc-rs-core
    Doc {
        /// Include private items
        #[arg(short, long, default_value_t = false)]
        private: bool,

        /// Open the docs in a browser when done
        #[arg(short, long, default_value_t = false)]
        open: bool,
    },

    /// Boot bootdisc-rs-cli in QEMU through uefi-run
    Run {
        /// OVMF firmware image, when uefi-run cannot find one
        #[arg(long)]
        ovmf_code: Option<String>,

        /// Use the release-lto profile
        #[arg(short, long, default_value_t = false)]
        release: bool,

        /// Copy a file to the root of the boot image, such as a loader for the scan to find
        #[arg(long)]
        add_file: Vec<String>,
    },

    /// Run the library tests on the host, or the scan and NVRAM tests in QEMU
    Test {
        #[command(subcommand)]
        command: Option<Test>,
    },

    /// Fuzz one of the input decoders
    Fuzz {
        #[command(subcommand)]
        command: Fuzz,
    },
}

fn main() -> anyhow::Result<()> {
    match Args::parse().command {
        Commands::Build {
            release,
            arch,
            features,
            no_default_features,
        } => build::build_images(release, arch, features.as_deref(), no_default_features),
        Commands::Doc { private, open } => doc::doc_core(private, open),
        Commands::Run {
            ovmf_code,
            release,
            add_file,
        } => run::run_cli(ovmf_code.as_deref(), release, &add_file),
        Commands::Test { command } => test::test_crate(command),
        Commands::Fuzz { command } => fuzz::fuzz_decoder(command),
    }
}
