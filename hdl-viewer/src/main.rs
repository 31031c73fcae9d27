mod color;
mod config;
mod gui;
mod io;
mod opts;
mod slot;
mod source;
mod types;
mod utils;
mod viewer;

use crate::{
    color::build_color_handler, config::ViewerConfig, gui::Kiss3dSink, opts::Opts,
    source::Playback, utils::log_level_filter, viewer::Viewer,
};
use clap::Parser;
use eyre::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, Layer};

fn main() -> Result<()> {
    color_eyre::install()?;
    let opts = Opts::parse();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_thread_names(true)
        .with_filter(log_level_filter(opts.log_level));
    let subscriber = tracing_subscriber::registry().with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &opts.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    let color_field = opts.color_field.unwrap_or(config.color_field);

    let spec = opts.source_spec()?;
    info!("{spec:?}");
    let mut source = source::open_source(&spec, Playback::from_fps(opts.fps, opts.looping))?;

    let sink = Kiss3dSink::new(&config);
    let mut viewer = Viewer::new(sink, build_color_handler(color_field), &config);
    let stats = viewer.run(source.as_mut())?;
    info!(
        shown = stats.frames_shown,
        published = stats.frames_published,
        dropped = stats.frames_dropped,
        "viewer closed"
    );

    Ok(())
}
