use color_eyre::Result;
use inflight::app::App;
use inflight::renderer::config::RenderConfig;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let app = App::new(RenderConfig::default());
    app.run()?;

    Ok(())
}
