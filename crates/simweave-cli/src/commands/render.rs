use crate::cli::RenderArgs;
use crate::commands::{build_filters, load_parameters};
use crate::error::Result;
use simweave::core::params::Parameters;
use simweave::core::template::TemplateRenderer;
use simweave::engine::config::Environment;
use std::fs;
use tracing::{debug, info};

pub fn run(args: RenderArgs) -> Result<()> {
    let env = Environment::capture();
    let params = load_parameters(Parameters::new(), &args.params)?;
    let xsdir = args
        .xsdir
        .clone()
        .or_else(|| env.xsdir_path().filter(|path| path.is_file()));
    debug!("Nuclide index for rendering: {:?}", xsdir);

    let renderer = TemplateRenderer::new(build_filters(xsdir.as_deref())?);
    let rendered = renderer.render_file(&args.template, &params)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &rendered.contents)?;
            info!("Rendered {} to {:?}", rendered.file_name, path);
            println!("Rendered input written to {}", path.display());
        }
        None => print!("{}", rendered.contents),
    }
    Ok(())
}
