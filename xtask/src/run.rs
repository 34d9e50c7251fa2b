use duct::cmd;

use crate::{
    build::{Arch, IMAGE_FEATURES, image_path},
    vm::boot_in_qemu,
};

pub fn run_cli(
    ovmf_code: Option<&str>,
    release: bool,
    files: &[String],
) -> anyhow::Result<()> {
    let mut args = vec![
        "build",
        "--bin",
        "bootdisc-rs-cli",
        "--target",
        Arch::X64.target(),
        "--features",
        IMAGE_FEATURES,
    ];
    if release {
        args.extend(["--profile", "release-lto"]);
    }
    cmd("cargo", args).run()?;

    boot_in_qemu(&image_path("bootdisc-rs-cli", release), ovmf_code, files)
}
