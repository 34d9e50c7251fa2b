use duct::cmd;

pub fn doc_core(private: bool, open: bool) -> anyhow::Result<()> {
    let mut args = vec!["doc", "--no-deps", "-p", "bootdisc-rs-core"];
    args.extend(private.then_some("--document-private-items"));
    args.extend(open.then_some("--open"));

    cmd("cargo", args).run()?;
    Ok(())
}
