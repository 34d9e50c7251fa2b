use duct::cmd;

/// Boots an image in QEMU with uefi-run, installing uefi-run first if it is missing.
pub fn boot_in_qemu(image: &str, ovmf_code: Option<&str>, files: &[String]) -> anyhow::Result<()> {
    let mut args = vec!["-d"];
    if let Some(ovmf_code) = ovmf_code {
        args.extend(["-b", ovmf_code]);
    }
    for file in files {
        args.extend(["-f", file.as_str()]);
    }
    args.push(image);

    cmd!("cargo", "install", "uefi-run").run()?; // no-op when already installed
    if let Err(e) = cmd("uefi-run", args).run() {
        eprintln!("hint: pass --ovmf-code if QEMU could not load the firmware");
        return Err(e.into());
    }
    Ok(())
}
