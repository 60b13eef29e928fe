use clap::Parser;
use offerstamp::{
    Assembler, DirectoryLibrary, OfferStampError, PlaceholderMap, RenderConfig, RenderContext,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Assemble a sales-offer PDF from background pages and live values")]
struct Args {
    /// Asset root holding `backgrounds/` and `layouts/`
    #[arg(long)]
    assets: PathBuf,

    /// Number of pages to generate
    #[arg(long)]
    pages: usize,

    #[arg(long, default_value = "standard")]
    variant: String,

    /// RenderContext JSON (values, numbers, images, brands)
    #[arg(long)]
    context: Option<PathBuf>,

    /// RenderConfig JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sample text -> semantic key map
    #[arg(long)]
    placeholders: Option<PathBuf>,

    /// PDF appended after the rendered pages
    #[arg(long)]
    append: Option<PathBuf>,

    /// Single-page PDF drawn onto the configured secondary-graphic page
    #[arg(long)]
    secondary: Option<PathBuf>,

    /// JSONL trace of the run
    #[arg(long)]
    debug_log: Option<PathBuf>,

    #[arg(short, long)]
    out: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), OfferStampError> {
    let config = match &args.config {
        Some(path) => RenderConfig::from_path(path)?,
        None => RenderConfig::default(),
    };
    let placeholders = match &args.placeholders {
        Some(path) => PlaceholderMap::from_path(path)?,
        None => PlaceholderMap::new(),
    };
    let context = match &args.context {
        Some(path) => RenderContext::from_json_str(&std::fs::read_to_string(path)?)?,
        None => RenderContext::new(),
    };

    let mut builder = Assembler::builder(Arc::new(DirectoryLibrary::new(&args.assets)))
        .config(config)
        .placeholders(Arc::new(placeholders));
    if let Some(path) = &args.secondary {
        builder = builder.secondary_graphic(std::fs::read(path)?);
    }
    if let Some(path) = &args.debug_log {
        builder = builder.debug_log(path);
    }
    let assembler = builder.build()?;

    let appended = match &args.append {
        Some(path) => Some(std::fs::read(path)?),
        None => None,
    };
    let document = assembler.assemble(args.pages, &context, &args.variant, appended.as_deref())?;
    std::fs::write(&args.out, &document.bytes)?;

    log::info!(
        "wrote {} ({} pages, {} diagnostics)",
        args.out.display(),
        document.page_count,
        document.diagnostics.len()
    );
    Ok(())
}
