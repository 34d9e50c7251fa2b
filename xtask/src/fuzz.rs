use clap::Subcommand;
use duct::cmd;

#[derive(Subcommand)]
pub enum Fuzz {
    /// Feed random Boot#### variables to the load option decoder
    BootEntry,

    /// Feed random bootdisc.conf files to the config parser
    Config,
}

pub fn fuzz_decoder(command: Fuzz) -> anyhow::Result<()> {
    let mut args = vec!["fuzz", "run"];
    match command {
        Fuzz::BootEntry => args.push("boot_entry"),
        Fuzz::Config => args.push("config"),
    }

    cmd!("cargo", "install", "cargo-fuzz").run()?; // no-op when already installed
    cmd("cargo", args).run()?;
    Ok(())
}
