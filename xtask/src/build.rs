use clap::ValueEnum;
use duct::cmd;

/// Core features every UEFI image needs.
pub const IMAGE_FEATURES: &str = "bootdisc-rs-core/global_allocator,bootdisc-rs-core/panic_handler";

/// The firmware architectures an image can be built for.
#[derive(Clone, Copy, ValueEnum)]
pub enum Arch {
    X64,
    Ia32,
    Aa64,
}

impl Arch {
    pub const fn target(self) -> &'static str {
        match self {
            Self::X64 => "x86_64-unknown-uefi",
            Self::Ia32 => "i686-unknown-uefi",
            Self::Aa64 => "aarch64-unknown-uefi",
        }
    }
}

/// Returns where cargo places an image built for x64.
pub fn image_path(name: &str, release: bool) -> String {
    let profile = if release { "release-lto" } else { "debug" };
    format!("target/{}/{profile}/{name}.efi", Arch::X64.target())
}

pub fn build_images(
    release: bool,
    arch: Arch,
    features: Option<&[String]>,
    no_default_features: bool,
) -> anyhow::Result<()> {
    let mut features_arg = IMAGE_FEATURES.to_owned();
    for feature in features.unwrap_or_default() {
        features_arg.push(',');
        features_arg.push_str(feature);
    }

    let mut args = vec!["build", "--target", arch.target(), "--features", &features_arg];
    if release {
        args.extend(["--profile", "release-lto"]);
    }
    if no_default_features {
        args.push("--no-default-features");
    }

    cmd("cargo", args).run()?;
    Ok(())
}
