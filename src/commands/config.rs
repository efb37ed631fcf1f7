use anyhow::Result;
use daybook_core::config::DaybookConfig;
use owo_colors::OwoColorize;

pub fn run(config: &DaybookConfig) -> Result<()> {
    let config_path = DaybookConfig::config_path()?;

    println!("{}", "Paths".bold());
    println!("  Config:     {}", config_path.display());
    println!("  Documents:  {}", config.documents_path().display());
    println!("  Accounts:   {}", config.identity_path().display());
    println!();
    println!("{}", "Settings".bold());
    for line in config.to_toml()?.lines().filter(|l| !l.is_empty()) {
        println!("  {line}");
    }

    Ok(())
}
