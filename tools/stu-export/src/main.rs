//! stu-export - STU container export tool
//!
//! Converts 3D scenes (glTF/GLB/OBJ) to the chunked `.stu` container
//! consumed by the rendering engine.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use stu_common::formats::container::{ChunkAppender, ContainerBuilder};
use stu_export::flatten::{export_scene, ExportOptions};
use stu_export::providers;

#[derive(Parser)]
#[command(name = "stu-export")]
#[command(about = "Converts 3D scenes (glTF/GLB/OBJ) to the STU container format")]
#[command(version)]
struct Cli {
    /// Input scene file
    input: PathBuf,

    /// Output .stu file (default: input path with ".stu" appended)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Flip the UV Y axis on every vertex
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    flip_uv: bool,

    /// Force the minimal OBJ importer instead of extension routing
    #[arg(short = 'a', long)]
    alternate: bool,

    /// Buffer all chunks in memory and write the file in one pass instead
    /// of appending chunk by chunk
    #[arg(long)]
    bulk: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let output = cli.output.unwrap_or_else(|| {
        let mut path = cli.input.clone().into_os_string();
        path.push(".stu");
        PathBuf::from(path)
    });

    let (scene, importer_tag) = providers::load_scene(&cli.input, cli.alternate)?;
    let options = ExportOptions {
        flip_uv: cli.flip_uv,
        importer_tag: importer_tag.to_string(),
    };

    tracing::info!("Converting {:?} -> {:?}", cli.input, output);

    // append mode extends whatever is on disk; a fresh export starts clean
    if output.exists() {
        std::fs::remove_file(&output)?;
    }

    if cli.bulk {
        let mut builder = ContainerBuilder::new();
        export_scene(&scene, &mut builder, &options)?;
        builder.flush(&output)?;
    } else {
        let mut appender = ChunkAppender::new(&output);
        export_scene(&scene, &mut appender, &options)?;
    }

    tracing::info!("Done!");
    Ok(())
}
