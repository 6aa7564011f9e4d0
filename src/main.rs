fn main() -> anyhow::Result<()> {
    let exit_code = litua::cli::run()?;
    std::process::exit(exit_code);
}
