use anyhow::{bail, Result};
use codegen_api::{
    config::AppConfig,
    inference::{CausalLm, TextGenerator},
    telemetry,
};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    telemetry::init();

    let prompt = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.is_empty() {
        bail!("usage: codegen-cli <prompt>");
    }

    let model = CausalLm::load(&config.model).await?;
    let params = config.generation;
    let output = tokio::task::spawn_blocking(move || model.generate(&prompt, params)).await??;

    println!("{output}");
    Ok(())
}
