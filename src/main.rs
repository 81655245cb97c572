use anyhow::Context;
use sen12mosaic::{
    Credentials, LogSink, MosaicPipeline, RunConfig, S2BandReader, SnapGptProcessor,
};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let config = RunConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let credentials = Credentials::from_json_file(&config.credentials_file)?;
    let catalog =
        sen12mosaic::CopernicusCatalog::authenticate(&credentials.username, &credentials.password)
            .context("Copernicus Data Space authentication failed")?;

    let gpt_path = std::env::var("GPT_BIN").unwrap_or_else(|_| "gpt".to_string());
    let s1_processor = SnapGptProcessor::new(gpt_path);
    let s2_processor = S2BandReader;
    let sink = LogSink;

    let pipeline = MosaicPipeline::new(&config, &catalog, &s2_processor, &s1_processor, &sink);
    let summary = pipeline.run()?;
    println!("{}", summary);
    Ok(())
}
