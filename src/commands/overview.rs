use anyhow::Result;
use daybook_core::config::DaybookConfig;

use crate::render::Render;

pub async fn run(config: &DaybookConfig) -> Result<()> {
    let daybook = super::open_session(config).await?;
    println!("{}", daybook.overview().render());
    Ok(())
}
