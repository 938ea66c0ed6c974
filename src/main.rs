use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use rootcause::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swbfmsh::crc::to_crc;
use swbfmsh::models::graph::{PrepareOptions, prepare_scene};
use swbfmsh::models::Scene;
use swbfmsh::msh::{SaveOptions, read_scene_file, save_scene_file};
use swbfmsh::zaa::{self, ZaaAnimationSet};

/// Inspect and rewrite Star Wars Battlefront .msh models and .zaabin animation banks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log structural decisions (same as RUST_LOG=debug)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize one or more .msh files. Glob patterns are expanded.
    Info {
        /// Dump the summaries as JSON
        #[clap(long)]
        json: bool,

        paths: Vec<String>,
    },
    /// Read a .msh, prepare it for the engine and write it back out
    Restrip {
        /// Build real triangle strips instead of one strip per triangle.
        /// Slow on large meshes.
        #[clap(long)]
        strips: bool,

        /// The file only carries a skeleton; give its root placeholder geometry
        #[clap(long)]
        skeleton_only: bool,

        input: PathBuf,

        /// Defaults to overwriting the input
        output: Option<PathBuf>,
    },
    /// List the animations and bones in a .zaabin/.zaa bank
    Zaa {
        /// `.anims` file with animation names. Defaults to the one next to
        /// a .zaabin input.
        #[clap(long)]
        anims: Option<PathBuf>,

        /// Print every component curve, one value per frame
        #[clap(long)]
        dense: bool,

        path: PathBuf,
    },
    /// Print the ZeroEngine hash of each name
    Crc { names: Vec<String> },
}

#[derive(Debug, serde::Serialize)]
struct SceneSummary {
    path: PathBuf,
    name: String,
    models: usize,
    materials: usize,
    segments: usize,
    triangles: usize,
    skinned_segments: usize,
    animation: Option<String>,
}

impl SceneSummary {
    fn new(path: &Path, scene: &Scene) -> Self {
        let segments = || scene.models.iter().flat_map(|m| &m.geometry);
        SceneSummary {
            path: path.to_path_buf(),
            name: scene.name.clone(),
            models: scene.models.len(),
            materials: scene.materials.len(),
            segments: segments().count(),
            triangles: segments().map(|s| s.triangles().len()).sum(),
            skinned_segments: segments().filter(|s| s.weights.is_some()).count(),
            animation: scene.animation.as_ref().map(|a| a.name.clone()),
        }
    }
}

fn expand_paths(patterns: &[String]) -> Result<Vec<PathBuf>, Report> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let matches = glob::glob(pattern)
            .context_with(|| format!("Invalid glob pattern: {pattern}"))?;
        let before = paths.len();
        for entry in matches {
            paths.push(entry?);
        }
        if paths.len() == before {
            warn!("no files match {pattern}");
        }
    }
    Ok(paths)
}

fn run_info(paths: &[String], json: bool) -> Result<(), Report> {
    let paths = expand_paths(paths)?;
    if paths.is_empty() {
        bail!("No input files");
    }

    let summaries = paths
        .par_iter()
        .map(|path| -> Result<SceneSummary, Report> {
            let scene = read_scene_file(path)
                .context_with(|| format!("Failed to read {}", path.display()))?;
            Ok(SceneSummary::new(path, &scene))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    for summary in summaries {
        println!("{}", summary.path.display());
        println!("  name:       {}", summary.name);
        println!("  models:     {}", summary.models);
        println!("  materials:  {}", summary.materials);
        println!(
            "  segments:   {} ({} skinned)",
            summary.segments, summary.skinned_segments
        );
        println!("  triangles:  {}", summary.triangles);
        if let Some(animation) = summary.animation {
            println!("  animation:  {animation}");
        }
    }
    Ok(())
}

fn run_restrip(
    input: &Path,
    output: Option<&Path>,
    strips: bool,
    skeleton_only: bool,
) -> Result<(), Report> {
    let mut scene = read_scene_file(input)
        .context_with(|| format!("Failed to read {}", input.display()))?;

    let prepare = PrepareOptions::builder().skeleton_only(skeleton_only).build();
    prepare_scene(&mut scene, &prepare);

    let output = output.unwrap_or(input);
    let options = SaveOptions::builder()
        .generate_triangle_strips(strips)
        .build();
    save_scene_file(output, &scene, &options)
        .context_with(|| format!("Failed to write {}", output.display()))?;
    info!(
        "wrote {} models to {}",
        scene.models.len(),
        output.display()
    );
    Ok(())
}

fn print_bank(set: &ZaaAnimationSet, names: &[String], dense: bool) {
    const COMPONENTS: [&str; 7] = ["rx", "ry", "rz", "rw", "tx", "ty", "tz"];

    for anim in &set.animations {
        println!(
            "{} ({} frames, {} bones)",
            zaa::anim_name(anim.crc, names),
            anim.num_frames,
            anim.num_bones
        );
        for bone in &anim.bones {
            let keys: usize = bone
                .rotation
                .iter()
                .chain(&bone.translation)
                .map(|c| c.len())
                .sum();
            println!("  bone {:#010x}: {keys} keys", bone.crc);
            if !dense {
                continue;
            }
            for (label, curve) in COMPONENTS
                .iter()
                .zip(bone.rotation.iter().chain(&bone.translation))
            {
                let values = curve
                    .to_dense(anim.num_frames)
                    .iter()
                    .map(|v| format!("{v:.4}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("    {label}: {values}");
            }
        }
    }
}

fn run_zaa(path: &Path, anims: Option<&Path>, dense: bool) -> Result<(), Report> {
    let set = zaa::read_zaa_file(path)
        .context_with(|| format!("Failed to read {}", path.display()))?;

    let names = match anims {
        Some(anims) => {
            let text = std::fs::read_to_string(anims)
                .context_with(|| format!("Failed to read {}", anims.display()))?;
            zaa::parse_anims_file(&text)
        }
        None if path.extension().is_some_and(|ext| ext == "zaabin") => {
            zaa::read_anims_file(path)?
        }
        None => Vec::new(),
    };

    print_bank(&set, &names, dense);
    Ok(())
}

fn main() -> Result<(), Report> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Info { json, paths } => run_info(&paths, json),
        Command::Restrip {
            strips,
            skeleton_only,
            input,
            output,
        } => run_restrip(&input, output.as_deref(), strips, skeleton_only),
        Command::Zaa { anims, dense, path } => run_zaa(&path, anims.as_deref(), dense),
        Command::Crc { names } => {
            for name in names {
                println!("{:#010x}  {name}", to_crc(&name));
            }
            Ok(())
        }
    }
}
